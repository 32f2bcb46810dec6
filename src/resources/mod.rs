//! Entity catalog. Every table the API exposes is described here once and the
//! generic resource router is instantiated from these definitions.

use serde_json::{Map, Value};

/// A database row rendered as a JSON object.
pub type Record = Map<String, Value>;

/// Column types the catalog uses; parameters are bound as text and cast to these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    BigInt,
    Numeric,
    Date,
    Boolean,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::BigInt => "BIGINT",
            SqlType::Numeric => "NUMERIC",
            SqlType::Date => "DATE",
            SqlType::Boolean => "BOOLEAN",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
}

const fn col(name: &'static str, sql_type: SqlType) -> Column {
    Column { name, sql_type }
}

/// System column present on every table, never writable through the API.
pub const ID_COLUMN: Column = col("id", SqlType::BigInt);

#[derive(Debug)]
pub struct ResourceDef {
    /// Route prefix and path segment, e.g. "clients"
    pub name: &'static str,
    pub table: &'static str,
    /// Human readable singular for messages
    pub label: &'static str,
    /// Unique natural key addressed by `GET /:key` and `DELETE /delete/:key`
    pub key: Option<&'static str>,
    /// Writable columns
    pub columns: &'static [Column],
    /// Column holding a password hash: hashed on write, never returned
    pub secret: Option<&'static str>,
    /// Whether the generic `POST /<name>/create` route is mounted
    pub create_route: bool,
}

impl ResourceDef {
    /// Look up a column by name, including `id`.
    pub fn column(&self, name: &str) -> Option<&Column> {
        if name == ID_COLUMN.name {
            return Some(&ID_COLUMN);
        }
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn is_writable(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Fields in `payload` that are not writable columns, sorted.
    pub fn unknown_fields(&self, payload: &Record) -> Vec<String> {
        let mut unknown: Vec<String> = payload
            .keys()
            .filter(|k| !self.is_writable(k))
            .cloned()
            .collect();
        unknown.sort();
        unknown
    }

    /// Strip the secret column before a record leaves the service.
    pub fn redact(&self, mut record: Record) -> Record {
        if let Some(secret) = self.secret {
            record.remove(secret);
        }
        record
    }
}

use SqlType::*;

pub static ROLES: ResourceDef = ResourceDef {
    name: "roles",
    table: "roles",
    label: "Role",
    key: Some("role_name"),
    columns: &[col("role_name", Text)],
    secret: None,
    create_route: true,
};

pub static USERS: ResourceDef = ResourceDef {
    name: "users",
    table: "users",
    label: "User",
    key: Some("user_email"),
    columns: &[
        col("user_firstname", Text),
        col("user_lastname", Text),
        col("user_email", Text),
        col("user_password", Text),
        col("user_phonenumber", Text),
        col("role_id", BigInt),
    ],
    secret: Some("user_password"),
    // Users are created through /signup
    create_route: false,
};

pub static CLIENTS: ResourceDef = ResourceDef {
    name: "clients",
    table: "clients",
    label: "Client",
    key: Some("client_email"),
    columns: &[
        col("client_name", Text),
        col("client_document", Text),
        col("client_email", Text),
        col("client_phonenumber", Text),
        col("client_address", Text),
    ],
    secret: None,
    create_route: true,
};

pub static PROVIDERS: ResourceDef = ResourceDef {
    name: "providers",
    table: "providers",
    label: "Provider",
    key: Some("provider_email"),
    columns: &[
        col("provider_name", Text),
        col("provider_email", Text),
        col("provider_phonenumber", Text),
        col("provider_address", Text),
    ],
    secret: None,
    create_route: true,
};

pub static PRODUCTS: ResourceDef = ResourceDef {
    name: "products",
    table: "products",
    label: "Product",
    key: Some("product_code"),
    columns: &[
        col("product_code", Text),
        col("product_name", Text),
        col("product_description", Text),
        col("product_price", Numeric),
        col("product_stock", BigInt),
        col("provider_id", BigInt),
    ],
    secret: None,
    create_route: true,
};

pub static TICKETS: ResourceDef = ResourceDef {
    name: "tickets",
    table: "tickets",
    label: "Ticket",
    key: None,
    columns: &[
        col("ticket_subject", Text),
        col("ticket_description", Text),
        col("ticket_status", Text),
        col("client_id", BigInt),
        col("user_id", BigInt),
    ],
    secret: None,
    create_route: true,
};

pub static INVOICES: ResourceDef = ResourceDef {
    name: "invoices",
    table: "invoices",
    label: "Invoice",
    key: Some("invoice_number"),
    columns: &[
        col("invoice_number", Text),
        col("invoice_date", Date),
        col("invoice_total", Numeric),
        col("invoice_paid", Boolean),
        col("client_id", BigInt),
    ],
    secret: None,
    create_route: true,
};

pub static PROPERTIES: ResourceDef = ResourceDef {
    name: "properties",
    table: "properties",
    label: "Property",
    key: None,
    columns: &[
        col("property_name", Text),
        col("property_address", Text),
        col("property_type", Text),
        col("property_price", Numeric),
        col("client_id", BigInt),
    ],
    secret: None,
    create_route: true,
};

pub static LEGALS: ResourceDef = ResourceDef {
    name: "legals",
    table: "legals",
    label: "Legal record",
    key: None,
    columns: &[
        col("legal_title", Text),
        col("legal_description", Text),
        col("legal_document", Text),
        col("client_id", BigInt),
    ],
    secret: None,
    create_route: true,
};

pub static REPORTS: ResourceDef = ResourceDef {
    name: "reports",
    table: "reports",
    label: "Report",
    key: None,
    columns: &[
        col("report_title", Text),
        col("report_content", Text),
        col("user_id", BigInt),
    ],
    secret: None,
    create_route: true,
};

/// Resources served by the plain generic router. Users get their own router
/// on top of the generic one.
pub static CATALOG: &[&ResourceDef] = &[
    &CLIENTS,
    &PROVIDERS,
    &PRODUCTS,
    &TICKETS,
    &INVOICES,
    &PROPERTIES,
    &LEGALS,
    &REPORTS,
    &ROLES,
];
