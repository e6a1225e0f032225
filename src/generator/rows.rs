//! Fixed-shape row structs for the eight TPC-H tables.
//!
//! Money is held in integer cents and text in NUL-terminated inline arrays.
//! The synthesis here is shaped like TPC-H (keys, ranges, vocabularies) but
//! makes no attempt at its exact distributions.

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;

use super::reference::{self, pick, retail_price_cents};
use super::text::FixedText;
use super::{Column, GenerationContext, TableRow};
use crate::tables::Table;

pub type DateText = FixedText<11>;

fn phone(text: &mut FixedText<16>, rng: &mut Xoshiro256PlusPlus, nationkey: i64) {
    text.set_fmt(format_args!(
        "{}-{}-{}-{}",
        nationkey + 10,
        rng.random_range(100..1000),
        rng.random_range(100..1000),
        rng.random_range(1000..10000)
    ));
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PartRow {
    pub partkey: i64,
    pub name: FixedText<56>,
    pub mfgr: FixedText<26>,
    pub brand: FixedText<11>,
    pub kind: FixedText<26>,
    pub size: i64,
    pub container: FixedText<11>,
    pub retailprice: i64,
    pub comment: FixedText<24>,
}

impl TableRow for PartRow {
    const TABLE: Table = Table::Part;

    fn columns() -> &'static [Column<Self>] {
        static COLUMNS: [Column<PartRow>; 9] = [
            Column::int("p_partkey", |r| r.partkey),
            Column::text("p_name", |r| r.name.raw()),
            Column::text("p_mfgr", |r| r.mfgr.raw()),
            Column::text("p_brand", |r| r.brand.raw()),
            Column::text("p_type", |r| r.kind.raw()),
            Column::int("p_size", |r| r.size),
            Column::text("p_container", |r| r.container.raw()),
            Column::money("p_retailprice", |r| r.retailprice),
            Column::text("p_comment", |r| r.comment.raw()),
        ];
        &COLUMNS
    }

    fn generate(ctx: &GenerationContext, key: u64, rng: &mut Xoshiro256PlusPlus) -> Self {
        let partkey = key as i64;
        let mut row = PartRow {
            partkey,
            size: rng.random_range(1..=50),
            retailprice: retail_price_cents(partkey),
            ..Default::default()
        };
        row.name.set_fmt(format_args!(
            "{} {} {} {} {}",
            pick(rng, &reference::PART_COLORS),
            pick(rng, &reference::PART_COLORS),
            pick(rng, &reference::PART_COLORS),
            pick(rng, &reference::PART_COLORS),
            pick(rng, &reference::PART_COLORS)
        ));
        let m = rng.random_range(1..=5);
        row.mfgr.set_fmt(format_args!("Manufacturer#{}", m));
        row.brand
            .set_fmt(format_args!("Brand#{}{}", m, rng.random_range(1..=5)));
        row.kind.set_fmt(format_args!(
            "{} {} {}",
            pick(rng, &reference::TYPE_SIZES),
            pick(rng, &reference::TYPE_FINISHES),
            pick(rng, &reference::TYPE_MATERIALS)
        ));
        row.container.set_fmt(format_args!(
            "{} {}",
            pick(rng, &reference::CONTAINER_SIZES),
            pick(rng, &reference::CONTAINER_KINDS)
        ));
        row.comment.set(ctx.text(rng, 5, 22));
        row
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SupplierRow {
    pub suppkey: i64,
    pub name: FixedText<26>,
    pub address: FixedText<41>,
    pub nationkey: i64,
    pub phone: FixedText<16>,
    pub acctbal: i64,
    pub comment: FixedText<102>,
}

impl TableRow for SupplierRow {
    const TABLE: Table = Table::Supplier;

    fn columns() -> &'static [Column<Self>] {
        static COLUMNS: [Column<SupplierRow>; 7] = [
            Column::int("s_suppkey", |r| r.suppkey),
            Column::text("s_name", |r| r.name.raw()),
            Column::text("s_address", |r| r.address.raw()),
            Column::int("s_nationkey", |r| r.nationkey),
            Column::text("s_phone", |r| r.phone.raw()),
            Column::money("s_acctbal", |r| r.acctbal),
            Column::text("s_comment", |r| r.comment.raw()),
        ];
        &COLUMNS
    }

    fn generate(ctx: &GenerationContext, key: u64, rng: &mut Xoshiro256PlusPlus) -> Self {
        let nationkey = rng.random_range(0..reference::NATIONS.len() as i64);
        let mut row = SupplierRow {
            suppkey: key as i64,
            nationkey,
            acctbal: rng.random_range(-99_999..=999_999),
            ..Default::default()
        };
        row.name.set_fmt(format_args!("Supplier#{:09}", key));
        row.address.set_random(rng, 10, 40);
        phone(&mut row.phone, rng, nationkey);
        row.comment.set(ctx.text(rng, 25, 100));
        row
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PartSuppRow {
    pub partkey: i64,
    pub suppkey: i64,
    pub availqty: i64,
    pub supplycost: i64,
    pub comment: FixedText<200>,
}

impl TableRow for PartSuppRow {
    const TABLE: Table = Table::PartSupp;

    fn columns() -> &'static [Column<Self>] {
        static COLUMNS: [Column<PartSuppRow>; 5] = [
            Column::int("ps_partkey", |r| r.partkey),
            Column::int("ps_suppkey", |r| r.suppkey),
            Column::int("ps_availqty", |r| r.availqty),
            Column::money("ps_supplycost", |r| r.supplycost),
            Column::text("ps_comment", |r| r.comment.raw()),
        ];
        &COLUMNS
    }

    fn generate(ctx: &GenerationContext, key: u64, rng: &mut Xoshiro256PlusPlus) -> Self {
        // Four suppliers per part, spread across the supplier key space
        let partkey = ((key - 1) / 4 + 1) as i64;
        let i = ((key - 1) % 4) as i64;
        let suppliers = ctx.row_count(Table::Supplier) as i64;
        let suppkey = (partkey + i * (suppliers / 4 + (partkey - 1) / suppliers)) % suppliers + 1;

        let mut row = PartSuppRow {
            partkey,
            suppkey,
            availqty: rng.random_range(1..=9_999),
            supplycost: rng.random_range(100..=100_000),
            ..Default::default()
        };
        row.comment.set(ctx.text(rng, 49, 198));
        row
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CustomerRow {
    pub custkey: i64,
    pub name: FixedText<26>,
    pub address: FixedText<41>,
    pub nationkey: i64,
    pub phone: FixedText<16>,
    pub acctbal: i64,
    pub mktsegment: FixedText<11>,
    pub comment: FixedText<118>,
}

impl TableRow for CustomerRow {
    const TABLE: Table = Table::Customer;

    fn columns() -> &'static [Column<Self>] {
        static COLUMNS: [Column<CustomerRow>; 8] = [
            Column::int("c_custkey", |r| r.custkey),
            Column::text("c_name", |r| r.name.raw()),
            Column::text("c_address", |r| r.address.raw()),
            Column::int("c_nationkey", |r| r.nationkey),
            Column::text("c_phone", |r| r.phone.raw()),
            Column::money("c_acctbal", |r| r.acctbal),
            Column::text("c_mktsegment", |r| r.mktsegment.raw()),
            Column::text("c_comment", |r| r.comment.raw()),
        ];
        &COLUMNS
    }

    fn generate(ctx: &GenerationContext, key: u64, rng: &mut Xoshiro256PlusPlus) -> Self {
        let nationkey = rng.random_range(0..reference::NATIONS.len() as i64);
        let mut row = CustomerRow {
            custkey: key as i64,
            nationkey,
            acctbal: rng.random_range(-99_999..=999_999),
            ..Default::default()
        };
        row.name.set_fmt(format_args!("Customer#{:09}", key));
        row.address.set_random(rng, 10, 40);
        phone(&mut row.phone, rng, nationkey);
        row.mktsegment.set(pick(rng, &reference::MARKET_SEGMENTS));
        row.comment.set(ctx.text(rng, 29, 116));
        row
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrderRow {
    pub orderkey: i64,
    pub custkey: i64,
    pub orderstatus: u8,
    pub totalprice: i64,
    pub orderdate: DateText,
    pub orderpriority: FixedText<16>,
    pub clerk: FixedText<16>,
    pub shippriority: i64,
    pub comment: FixedText<80>,
}

impl TableRow for OrderRow {
    const TABLE: Table = Table::Orders;

    fn columns() -> &'static [Column<Self>] {
        static COLUMNS: [Column<OrderRow>; 9] = [
            Column::int("o_orderkey", |r| r.orderkey),
            Column::int("o_custkey", |r| r.custkey),
            Column::char("o_orderstatus", |r| &r.orderstatus),
            Column::money("o_totalprice", |r| r.totalprice),
            Column::text("o_orderdate", |r| r.orderdate.raw()),
            Column::text("o_orderpriority", |r| r.orderpriority.raw()),
            Column::text("o_clerk", |r| r.clerk.raw()),
            Column::int("o_shippriority", |r| r.shippriority),
            Column::text("o_comment", |r| r.comment.raw()),
        ];
        &COLUMNS
    }

    fn generate(ctx: &GenerationContext, key: u64, rng: &mut Xoshiro256PlusPlus) -> Self {
        let customers = ctx.row_count(Table::Customer) as i64;
        let clerks = ((ctx.scale_factor() * 1000.0) as i64).max(1);
        let mut row = OrderRow {
            orderkey: key as i64,
            custkey: rng.random_range(1..=customers),
            orderstatus: reference::ORDER_STATUS[rng.random_range(0..reference::ORDER_STATUS.len())],
            totalprice: rng.random_range(90_000..=50_000_000),
            shippriority: 0,
            ..Default::default()
        };
        row.orderdate
            .set(ctx.date(rng.random_range(0..ctx.date_count() - 151)));
        row.orderpriority.set(pick(rng, &reference::ORDER_PRIORITIES));
        row.clerk
            .set_fmt(format_args!("Clerk#{:09}", rng.random_range(1..=clerks)));
        row.comment.set(ctx.text(rng, 19, 78));
        row
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LineItemRow {
    pub orderkey: i64,
    pub partkey: i64,
    pub suppkey: i64,
    pub linenumber: i64,
    pub quantity: i64,
    pub extendedprice: i64,
    pub discount: i64,
    pub tax: i64,
    pub returnflag: u8,
    pub linestatus: u8,
    pub shipdate: DateText,
    pub commitdate: DateText,
    pub receiptdate: DateText,
    pub shipinstruct: FixedText<26>,
    pub shipmode: FixedText<11>,
    pub comment: FixedText<45>,
}

impl TableRow for LineItemRow {
    const TABLE: Table = Table::LineItem;

    fn columns() -> &'static [Column<Self>] {
        static COLUMNS: [Column<LineItemRow>; 16] = [
            Column::int("l_orderkey", |r| r.orderkey),
            Column::int("l_partkey", |r| r.partkey),
            Column::int("l_suppkey", |r| r.suppkey),
            Column::int("l_linenumber", |r| r.linenumber),
            Column::money("l_quantity", |r| r.quantity),
            Column::money("l_extendedprice", |r| r.extendedprice),
            Column::money("l_discount", |r| r.discount),
            Column::money("l_tax", |r| r.tax),
            Column::char("l_returnflag", |r| &r.returnflag),
            Column::char("l_linestatus", |r| &r.linestatus),
            Column::text("l_shipdate", |r| r.shipdate.raw()),
            Column::text("l_commitdate", |r| r.commitdate.raw()),
            Column::text("l_receiptdate", |r| r.receiptdate.raw()),
            Column::text("l_shipinstruct", |r| r.shipinstruct.raw()),
            Column::text("l_shipmode", |r| r.shipmode.raw()),
            Column::text("l_comment", |r| r.comment.raw()),
        ];
        &COLUMNS
    }

    fn generate(ctx: &GenerationContext, key: u64, rng: &mut Xoshiro256PlusPlus) -> Self {
        let parts = ctx.row_count(Table::Part) as i64;
        let suppliers = ctx.row_count(Table::Supplier) as i64;
        let partkey = rng.random_range(1..=parts);
        let quantity = rng.random_range(1..=50i64);

        let order_day = rng.random_range(0..ctx.date_count() - 151);
        let ship_day = order_day + rng.random_range(1..=121);
        let commit_day = order_day + rng.random_range(30..=90);
        let receipt_day = ship_day + rng.random_range(1..=30);

        let returnflag = if receipt_day <= reference::CURRENT_DATE_INDEX {
            if rng.random_bool(0.5) {
                b'R'
            } else {
                b'A'
            }
        } else {
            b'N'
        };
        let linestatus = if ship_day > reference::CURRENT_DATE_INDEX {
            b'O'
        } else {
            b'F'
        };

        let mut row = LineItemRow {
            orderkey: ((key - 1) / 4 + 1) as i64,
            partkey,
            suppkey: rng.random_range(1..=suppliers),
            linenumber: ((key - 1) % 4 + 1) as i64,
            quantity: quantity * 100,
            extendedprice: quantity * retail_price_cents(partkey),
            discount: rng.random_range(0..=10),
            tax: rng.random_range(0..=8),
            returnflag,
            linestatus,
            ..Default::default()
        };
        row.shipdate.set(ctx.date(ship_day));
        row.commitdate.set(ctx.date(commit_day));
        row.receiptdate.set(ctx.date(receipt_day));
        row.shipinstruct.set(pick(rng, &reference::SHIP_INSTRUCTIONS));
        row.shipmode.set(pick(rng, &reference::SHIP_MODES));
        row.comment.set(ctx.text(rng, 10, 43));
        row
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NationRow {
    pub nationkey: i64,
    pub name: FixedText<26>,
    pub regionkey: i64,
    pub comment: FixedText<153>,
}

impl TableRow for NationRow {
    const TABLE: Table = Table::Nation;

    fn columns() -> &'static [Column<Self>] {
        static COLUMNS: [Column<NationRow>; 4] = [
            Column::int("n_nationkey", |r| r.nationkey),
            Column::text("n_name", |r| r.name.raw()),
            Column::int("n_regionkey", |r| r.regionkey),
            Column::text("n_comment", |r| r.comment.raw()),
        ];
        &COLUMNS
    }

    fn generate(ctx: &GenerationContext, key: u64, rng: &mut Xoshiro256PlusPlus) -> Self {
        let (name, regionkey) = reference::NATIONS[(key - 1) as usize % reference::NATIONS.len()];
        let mut row = NationRow {
            nationkey: key as i64 - 1,
            regionkey,
            ..Default::default()
        };
        row.name.set(name);
        row.comment.set(ctx.text(rng, 31, 114));
        row
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RegionRow {
    pub regionkey: i64,
    pub name: FixedText<26>,
    pub comment: FixedText<153>,
}

impl TableRow for RegionRow {
    const TABLE: Table = Table::Region;

    fn columns() -> &'static [Column<Self>] {
        static COLUMNS: [Column<RegionRow>; 3] = [
            Column::int("r_regionkey", |r| r.regionkey),
            Column::text("r_name", |r| r.name.raw()),
            Column::text("r_comment", |r| r.comment.raw()),
        ];
        &COLUMNS
    }

    fn generate(ctx: &GenerationContext, key: u64, rng: &mut Xoshiro256PlusPlus) -> Self {
        let mut row = RegionRow {
            regionkey: key as i64 - 1,
            ..Default::default()
        };
        row.name
            .set(reference::REGIONS[(key - 1) as usize % reference::REGIONS.len()]);
        row.comment.set(ctx.text(rng, 31, 114));
        row
    }
}
