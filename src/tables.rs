//! TPC-H table identifiers and their scale arithmetic

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Part,
    Supplier,
    PartSupp,
    Customer,
    Orders,
    LineItem,
    Nation,
    Region,
}

impl Table {
    pub const COUNT: usize = 8;

    pub const ALL: [Table; Table::COUNT] = [
        Table::Part,
        Table::Supplier,
        Table::PartSupp,
        Table::Customer,
        Table::Orders,
        Table::LineItem,
        Table::Nation,
        Table::Region,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Part => "part",
            Table::Supplier => "supplier",
            Table::PartSupp => "partsupp",
            Table::Customer => "customer",
            Table::Orders => "orders",
            Table::LineItem => "lineitem",
            Table::Nation => "nation",
            Table::Region => "region",
        }
    }

    /// Position in [`Table::ALL`]; also the table's RNG stream index.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Rows at scale factor 1.
    pub fn base_rows(self) -> u64 {
        match self {
            Table::Part => 200_000,
            Table::Supplier => 10_000,
            Table::PartSupp => 800_000,
            Table::Customer => 150_000,
            Table::Orders => 1_500_000,
            Table::LineItem => 6_000_000,
            Table::Nation => 25,
            Table::Region => 5,
        }
    }

    /// Whether the row count grows with the scale factor.
    pub fn is_scaled(self) -> bool {
        !matches!(self, Table::Nation | Table::Region)
    }

    /// Row count at `scale_factor`, never below one for scaled tables.
    pub fn row_count(self, scale_factor: f64) -> u64 {
        if !self.is_scaled() {
            return self.base_rows();
        }
        ((self.base_rows() as f64 * scale_factor).round() as u64).max(1)
    }

    /// Parse a comma separated list; `all` selects every table.
    pub fn parse_list(list: &str) -> Result<Vec<Table>, String> {
        let mut tables = Vec::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if item.eq_ignore_ascii_case("all") {
                return Ok(Table::ALL.to_vec());
            }
            let table = item.parse()?;
            if !tables.contains(&table) {
                tables.push(table);
            }
        }
        if tables.is_empty() {
            return Err("no tables selected".to_string());
        }
        Ok(tables)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown table '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_counts() {
        assert_eq!(Table::LineItem.row_count(1.0), 6_000_000);
        assert_eq!(Table::Orders.row_count(0.01), 15_000);
        assert_eq!(Table::Supplier.row_count(0.00001), 1);
        assert_eq!(Table::Nation.row_count(100.0), 25);
        assert_eq!(Table::Region.row_count(0.001), 5);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            Table::parse_list("orders, LINEITEM,orders").unwrap(),
            vec![Table::Orders, Table::LineItem]
        );
        assert_eq!(Table::parse_list("all").unwrap().len(), Table::COUNT);
        assert!(Table::parse_list("orders,bogus").is_err());
        assert!(Table::parse_list("").is_err());
    }

    #[test]
    fn test_index_matches_all() {
        for (i, table) in Table::ALL.iter().enumerate() {
            assert_eq!(table.index(), i);
        }
    }
}
