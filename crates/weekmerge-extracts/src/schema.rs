use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Backorder,
    Otif,
    Charged,
    Sales,
    Stock,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 5] = [
        DatasetKind::Backorder,
        DatasetKind::Otif,
        DatasetKind::Charged,
        DatasetKind::Sales,
        DatasetKind::Stock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Backorder => "backorder",
            DatasetKind::Otif => "otif",
            DatasetKind::Charged => "charged",
            DatasetKind::Sales => "sales",
            DatasetKind::Stock => "stock",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DatasetKind::Backorder => "Backorder",
            DatasetKind::Otif => "OTIF",
            DatasetKind::Charged => "Charged",
            DatasetKind::Sales => "Sales",
            DatasetKind::Stock => "Stock",
        }
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Float,
    Integer,
}

impl ColumnType {
    pub fn describe(&self) -> &'static str {
        match self {
            ColumnType::Text => "text value",
            ColumnType::Float => "floating point number",
            ColumnType::Integer => "integer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Windows1252,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NumberFormat {
    pub thousands: Option<char>,
    pub decimal_comma: bool,
}

impl NumberFormat {
    pub const PLAIN: NumberFormat = NumberFormat {
        thousands: None,
        decimal_comma: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnType,
    pub required: bool,
}

impl ColumnSpec {
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnType::Text,
            required: true,
        }
    }

    pub const fn float(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnType::Float,
            required: true,
        }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnType::Integer,
            required: true,
        }
    }

    pub const fn optional(self) -> Self {
        Self {
            required: false,
            ..self
        }
    }
}

/// Layout of one delimited extract: where it lives, how it is encoded and which
/// columns carry a declared type.
#[derive(Debug, Clone)]
pub struct ExtractSchema {
    pub name: &'static str,
    pub file_name: &'static str,
    pub separator: u8,
    pub encoding: TextEncoding,
    pub number_format: NumberFormat,
    pub columns: &'static [ColumnSpec],
    /// Number of trailing columns holding counts that get normalized to integers.
    pub trailing_count_columns: usize,
}

impl ExtractSchema {
    pub fn required_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.name)
    }
}

pub const BACKORDER: ExtractSchema = ExtractSchema {
    name: "backorder",
    file_name: "backorder.txt",
    separator: b'\t',
    encoding: TextEncoding::Utf8,
    number_format: NumberFormat {
        thousands: Some('.'),
        decimal_comma: false,
    },
    columns: &[
        ColumnSpec::text("Year Week"),
        ColumnSpec::text("UPC Code"),
        ColumnSpec::text("Pipeline - DtLoad"),
        ColumnSpec::float("Pipeline - PurchaseFromSuppliers"),
        ColumnSpec::float("Pipeline - Unsatisfied Demand"),
        ColumnSpec::float("Pipeline - WIP"),
        ColumnSpec::float("TotalDemand"),
        ColumnSpec::float("Productive BO"),
        ColumnSpec::float("Logistic BO"),
        ColumnSpec::text("DatestSubsidiaryCode"),
        ColumnSpec::float("Direct Shipment BO"),
        ColumnSpec::float("ECom - RetailModel"),
        ColumnSpec::float("To Be Shipped BO"),
    ],
    trailing_count_columns: 10,
};

pub const OTIF_RECLASS: ExtractSchema = ExtractSchema {
    name: "otif",
    file_name: "00_OTIF_Reclass.txt",
    separator: b';',
    encoding: TextEncoding::Windows1252,
    number_format: NumberFormat::PLAIN,
    columns: &[
        ColumnSpec::text("Style"),
        ColumnSpec::text("Grid"),
        ColumnSpec::text("Yyear"),
        ColumnSpec::text("Mmonth"),
        ColumnSpec::text("Wweek"),
        ColumnSpec::text("Qquarter"),
        ColumnSpec::text("BusinessUnit"),
        ColumnSpec::text("OrderSpecification"),
        ColumnSpec::text("OrderType"),
        ColumnSpec::text("KeyAccount"),
        ColumnSpec::text("Region"),
        ColumnSpec::float("OTIF Num Shipped Qty Net"),
        ColumnSpec::float("OTIF Den ToBeShpped Qty Net"),
        ColumnSpec::text("Release").optional(),
        ColumnSpec::text("SubCode").optional(),
        ColumnSpec::text("CP_cluster").optional(),
        ColumnSpec::text("DS_cluster").optional(),
        ColumnSpec::text("HUBDS").optional(),
        ColumnSpec::text("ASSORTMENT").optional(),
    ],
    trailing_count_columns: 0,
};

pub const CHARGED_EXPORT: ExtractSchema = ExtractSchema {
    name: "charged",
    file_name: "charged_export.txt",
    separator: b';',
    encoding: TextEncoding::Utf8,
    number_format: NumberFormat::PLAIN,
    columns: &[
        ColumnSpec::text("model"),
        ColumnSpec::text("grid"),
        ColumnSpec::text("ClusterKey"),
        ColumnSpec::text("UpdateYearWeekKey"),
        ColumnSpec::float("TotalChargedQuantity"),
        ColumnSpec::text("UPC").optional(),
    ],
    trailing_count_columns: 0,
};

pub const SALES_CURRENT: ExtractSchema = ExtractSchema {
    name: "sales_current",
    file_name: "sales_&_shipping_current.txt",
    separator: b'\t',
    encoding: TextEncoding::Utf8,
    number_format: NumberFormat::PLAIN,
    columns: &[ColumnSpec::text("UPC"), ColumnSpec::text("Datest WHS")],
    trailing_count_columns: 0,
};

pub const SALES_PAST: ExtractSchema = ExtractSchema {
    name: "sales_past",
    file_name: "sales_&_shipping_past.txt",
    ..SALES_CURRENT
};

pub const STOCK_CURRENT: ExtractSchema = ExtractSchema {
    name: "stock_current",
    file_name: "stock_current.txt",
    separator: b'\t',
    encoding: TextEncoding::Utf8,
    number_format: NumberFormat::PLAIN,
    columns: &[
        ColumnSpec::text("UPC"),
        ColumnSpec::text("Datest WHS"),
        ColumnSpec::text("Stock Category (6 digit) Code"),
        ColumnSpec::text("Year").optional(),
        ColumnSpec::text("Year Week").optional(),
    ],
    trailing_count_columns: 0,
};

pub const STOCK_PAST: ExtractSchema = ExtractSchema {
    name: "stock_past",
    file_name: "stock_past.txt",
    columns: &[
        ColumnSpec::text("UPC"),
        ColumnSpec::text("Datest WHS"),
        ColumnSpec::text("Stock Category (6 digit) Code"),
        ColumnSpec::text("Year"),
        ColumnSpec::text("Year Week"),
    ],
    ..STOCK_CURRENT
};
