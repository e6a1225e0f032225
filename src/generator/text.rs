//! NUL-terminated fixed-capacity text fields used inside row structs

use std::fmt;

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;

const ALPHANUMERIC: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ, ";

/// Text stored inline in a row with a terminating NUL.
///
/// `N` includes the terminator, so at most `N - 1` bytes of text fit. There is
/// no stored length: readers must find the terminator, see [`terminated_str`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FixedText<const N: usize>([u8; N]);

impl<const N: usize> Default for FixedText<N> {
    fn default() -> Self {
        Self([0; N])
    }
}

impl<const N: usize> FixedText<N> {
    pub const CAPACITY: usize = N - 1;

    pub fn new(s: &str) -> Self {
        let mut text = Self::default();
        text.set(s);
        text
    }

    /// Replace the contents, truncating at a char boundary if needed.
    pub fn set(&mut self, s: &str) {
        let mut len = s.len().min(Self::CAPACITY);
        while !s.is_char_boundary(len) {
            len -= 1;
        }
        self.0[..len].copy_from_slice(&s.as_bytes()[..len]);
        self.0[len] = 0;
    }

    /// Format into the field, truncating at capacity.
    pub fn set_fmt(&mut self, args: fmt::Arguments<'_>) {
        let mut cursor = Cursor { buf: &mut self.0, len: 0 };
        // Cursor never fails, it truncates
        let _ = fmt::write(&mut cursor, args);
        let len = cursor.len;
        self.0[len] = 0;
    }

    /// Random alphanumeric text with a length drawn from `min..=max`.
    pub fn set_random(&mut self, rng: &mut Xoshiro256PlusPlus, min: usize, max: usize) {
        let len = rng.random_range(min..=max).min(Self::CAPACITY);
        for byte in &mut self.0[..len] {
            *byte = ALPHANUMERIC[rng.random_range(0..ALPHANUMERIC.len())];
        }
        self.0[len] = 0;
    }

    /// The whole backing array, terminator and trailing bytes included.
    pub fn raw(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> Option<&str> {
        terminated_str(&self.0)
    }

    /// A field with no terminator, as a producer that skipped the field leaves it.
    pub fn unterminated(fill: u8) -> Self {
        Self([fill; N])
    }
}

impl<const N: usize> fmt::Debug for FixedText<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => write!(f, "{:?}", s),
            None => write!(f, "<unterminated {} bytes>", N),
        }
    }
}

/// The text before the first NUL, if there is one and it is valid UTF-8.
#[inline]
pub fn terminated_str(raw: &[u8]) -> Option<&str> {
    let len = raw.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&raw[..len]).ok()
}

struct Cursor<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl fmt::Write for Cursor<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // Keep one byte for the terminator
        let room = self.buf.len() - 1 - self.len;
        let mut take = s.len().min(room);
        while !s.is_char_boundary(take) {
            take -= 1;
        }
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_set_and_read_back() {
        let text = FixedText::<8>::new("abc");
        assert_eq!(text.as_str(), Some("abc"));
        assert_eq!(text.raw().len(), 8);
    }

    #[test]
    fn test_truncates_to_capacity() {
        let text = FixedText::<4>::new("abcdef");
        assert_eq!(text.as_str(), Some("abc"));
    }

    #[test]
    fn test_set_fmt() {
        let mut text = FixedText::<26>::default();
        text.set_fmt(format_args!("Customer#{:09}", 42));
        assert_eq!(text.as_str(), Some("Customer#000000042"));

        let mut small = FixedText::<5>::default();
        small.set_fmt(format_args!("{}", 123456));
        assert_eq!(small.as_str(), Some("1234"));
    }

    #[test]
    fn test_unterminated_is_rejected() {
        let text = FixedText::<6>::unterminated(b'x');
        assert_eq!(text.as_str(), None);
        assert_eq!(terminated_str(b"\xff\xfe\0"), None);
    }

    #[test]
    fn test_random_respects_bounds() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let mut text = FixedText::<41>::default();
        for _ in 0..100 {
            text.set_random(&mut rng, 10, 40);
            let len = text.as_str().unwrap().len();
            assert!((10..=40).contains(&len));
        }
    }
}
