//! Static reference data loaded by the shared generation context

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// (name, region key)
pub const NATIONS: [(&str, i64); 25] = [
    ("ALGERIA", 0),
    ("ARGENTINA", 1),
    ("BRAZIL", 1),
    ("CANADA", 1),
    ("EGYPT", 4),
    ("ETHIOPIA", 0),
    ("FRANCE", 3),
    ("GERMANY", 3),
    ("INDIA", 2),
    ("INDONESIA", 2),
    ("IRAN", 4),
    ("IRAQ", 4),
    ("JAPAN", 2),
    ("JORDAN", 4),
    ("KENYA", 0),
    ("MOROCCO", 0),
    ("MOZAMBIQUE", 0),
    ("PERU", 1),
    ("CHINA", 2),
    ("ROMANIA", 3),
    ("SAUDI ARABIA", 4),
    ("VIETNAM", 2),
    ("RUSSIA", 3),
    ("UNITED KINGDOM", 3),
    ("UNITED STATES", 1),
];

pub const REGIONS: [&str; 5] = ["AFRICA", "AMERICA", "ASIA", "EUROPE", "MIDDLE EAST"];

pub const ORDER_PRIORITIES: [&str; 5] = ["1-URGENT", "2-HIGH", "3-MEDIUM", "4-NOT SPECIFIED", "5-LOW"];

pub const ORDER_STATUS: [u8; 3] = [b'F', b'O', b'P'];

pub const SHIP_MODES: [&str; 7] = ["REG AIR", "AIR", "RAIL", "SHIP", "TRUCK", "MAIL", "FOB"];

pub const SHIP_INSTRUCTIONS: [&str; 4] = [
    "DELIVER IN PERSON",
    "COLLECT COD",
    "NONE",
    "TAKE BACK RETURN",
];

pub const MARKET_SEGMENTS: [&str; 5] = [
    "AUTOMOBILE",
    "BUILDING",
    "FURNITURE",
    "MACHINERY",
    "HOUSEHOLD",
];

pub const PART_COLORS: [&str; 40] = [
    "almond", "antique", "aquamarine", "azure", "beige", "bisque", "black", "blanched",
    "blue", "blush", "brown", "burlywood", "burnished", "chartreuse", "chiffon", "chocolate",
    "coral", "cornflower", "cornsilk", "cream", "cyan", "dark", "deep", "dim", "dodger",
    "drab", "firebrick", "floral", "forest", "frosted", "gainsboro", "ghost", "goldenrod",
    "green", "grey", "honeydew", "hot", "indian", "ivory", "khaki",
];

pub const TYPE_SIZES: [&str; 6] = ["STANDARD", "SMALL", "MEDIUM", "LARGE", "ECONOMY", "PROMO"];
pub const TYPE_FINISHES: [&str; 5] = ["ANODIZED", "BURNISHED", "PLATED", "POLISHED", "BRUSHED"];
pub const TYPE_MATERIALS: [&str; 5] = ["TIN", "NICKEL", "BRASS", "STEEL", "COPPER"];

pub const CONTAINER_SIZES: [&str; 5] = ["SM", "LG", "MED", "JUMBO", "WRAP"];
pub const CONTAINER_KINDS: [&str; 8] = ["CASE", "BOX", "BAG", "JAR", "PKG", "PACK", "CAN", "DRUM"];

/// Vocabulary for the comment text pool
pub const TEXT_WORDS: [&str; 48] = [
    "furiously", "sly", "careful", "blithely", "quickly", "fluffily", "slyly", "ironic",
    "final", "regular", "express", "pending", "bold", "even", "silent", "unusual",
    "special", "idle", "busy", "daring", "accounts", "deposits", "requests", "packages",
    "instructions", "theodolites", "pinto", "beans", "foxes", "ideas", "platelets",
    "asymptotes", "courts", "dolphins", "excuses", "frets", "warthogs", "dependencies",
    "sleep", "wake", "are", "cajole", "haggle", "nag", "use", "boost", "affix", "detect",
];

/// First order date of the generated calendar
pub const START_DATE: (i32, u32, u32) = (1992, 1, 1);
/// Last order date of the generated calendar
pub const END_DATE: (i32, u32, u32) = (1998, 12, 31);
/// Days from START_DATE to 1995-06-17, the "current date" of the benchmark
pub const CURRENT_DATE_INDEX: usize = 1263;

/// Pick one entry uniformly
pub fn pick<'a, T: ?Sized>(rng: &mut Xoshiro256PlusPlus, items: &'a [&'a T]) -> &'a T {
    items[rng.random_range(0..items.len())]
}

/// Retail price of a part in cents; depends only on the part key.
pub fn retail_price_cents(partkey: i64) -> i64 {
    90_000 + ((partkey / 10) % 20_001) + 100 * (partkey % 1_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nations_reference_valid_regions() {
        for (_, region) in NATIONS {
            assert!((region as usize) < REGIONS.len());
        }
    }

    #[test]
    fn test_retail_price() {
        assert_eq!(retail_price_cents(1), 90_100);
        assert_eq!(retail_price_cents(1000), 90_100);
    }
}
