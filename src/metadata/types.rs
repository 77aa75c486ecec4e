//! Catalog row types: one `ColumnAttribute` per table column, one `ValidationRule`
//! per business check, one `TableConfig` per table.

use serde::{Deserialize, Deserializer, Serialize};

/// Declared field type of a column. Unknown type names are kept verbatim and
/// receive no type-specific validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum FieldType {
    Date,
    Datetime,
    Int,
    BigInt,
    TinyInt,
    SmallInt,
    Decimal,
    Double,
    Varchar,
    Text,
    Email,
    Phone,
    Url,
    FileExtension,
    Range,
    Other(String),
}

impl FieldType {
    pub fn parse(s: &str) -> FieldType {
        match s.trim().to_lowercase().as_str() {
            "date" => FieldType::Date,
            "datetime" | "timestamp" => FieldType::Datetime,
            "int" | "integer" => FieldType::Int,
            "bigint" => FieldType::BigInt,
            "tinyint" => FieldType::TinyInt,
            "smallint" => FieldType::SmallInt,
            "decimal" | "numeric" => FieldType::Decimal,
            "double" | "float" => FieldType::Double,
            "varchar" | "char" => FieldType::Varchar,
            "text" => FieldType::Text,
            "email" => FieldType::Email,
            "phone" => FieldType::Phone,
            "url" => FieldType::Url,
            "file_extension" => FieldType::FileExtension,
            "range" => FieldType::Range,
            _ => FieldType::Other(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Int => "int",
            FieldType::BigInt => "bigint",
            FieldType::TinyInt => "tinyint",
            FieldType::SmallInt => "smallint",
            FieldType::Decimal => "decimal",
            FieldType::Double => "double",
            FieldType::Varchar => "varchar",
            FieldType::Text => "text",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Url => "url",
            FieldType::FileExtension => "file_extension",
            FieldType::Range => "range",
            FieldType::Other(s) => s.as_str(),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldType::Int | FieldType::BigInt | FieldType::TinyInt | FieldType::SmallInt
        )
    }

    pub fn is_decimal(&self) -> bool {
        matches!(self, FieldType::Decimal | FieldType::Double | FieldType::Range)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, FieldType::Date | FieldType::Datetime)
    }

    /// PostgreSQL type bound values are cast to; `None` binds as sent.
    pub fn sql_cast(&self) -> Option<&'static str> {
        match self {
            t if t.is_integer() => Some("bigint"),
            t if t.is_decimal() => Some("numeric"),
            FieldType::Date => Some("date"),
            FieldType::Datetime => Some("timestamp"),
            _ => None,
        }
    }

    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            FieldType::Varchar
                | FieldType::Text
                | FieldType::Email
                | FieldType::Phone
                | FieldType::Url
                | FieldType::FileExtension
        )
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> String {
        t.as_str().to_string()
    }
}

impl Default for FieldType {
    fn default() -> Self {
        FieldType::Varchar
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        Ok(s.map(|s| FieldType::parse(&s)).unwrap_or_default())
    }
}

/// How a searchable column is matched by the condition builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    #[serde(alias = "eq", alias = "=")]
    Exact,
    #[serde(alias = "like", alias = "contain")]
    Contains,
    #[serde(alias = "startsWith", alias = "starts_with")]
    Prefix,
    #[serde(alias = "between")]
    Range,
}

/// Accepts `true/false`, `0/1` and `"0"/"1"` for catalog flags.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    match v {
        serde_json::Value::Null => Ok(false),
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::Number(n) => Ok(n.as_i64().unwrap_or(0) != 0),
        serde_json::Value::String(s) => {
            let s = s.trim();
            Ok(s == "1" || s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("y"))
        }
        other => Err(serde::de::Error::custom(format!("flag must be a boolean or 0/1; got {}", other))),
    }
}

/// Accepts an unsigned number or a numeric string.
fn opt_len<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => Ok(n.as_u64().map(|n| n as u32)),
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(None),
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("len must be a number; got '{}'", s))),
        other => Err(serde::de::Error::custom(format!("len must be a number; got {}", other))),
    }
}

/// Column descriptor from `column_attribute`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ColumnAttribute {
    /// Logical (database) table the column belongs to.
    pub db_table_name: String,
    /// Display name of the table.
    #[serde(default)]
    pub table_name: Option<String>,
    pub name: String,
    /// Display label.
    #[serde(default)]
    pub page_name: Option<String>,
    #[serde(default)]
    pub field_type: FieldType,
    #[serde(default, deserialize_with = "opt_len")]
    pub len: Option<u32>,
    #[serde(default, deserialize_with = "flag")]
    pub is_required: bool,
    #[serde(default, deserialize_with = "flag")]
    pub edit_flag: bool,
    #[serde(default, deserialize_with = "flag")]
    pub search_flag: bool,
    /// Widget kind (`input`, `password`, `radio`, `select`, ...).
    #[serde(default)]
    pub show_type: Option<String>,
    #[serde(default)]
    pub query_type: Option<QueryType>,
    #[serde(default)]
    pub default_value: Option<String>,
    /// Delimited option list for choice widgets.
    #[serde(default)]
    pub options: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub is_pri: bool,
    #[serde(default, deserialize_with = "flag")]
    pub is_foreign_key: bool,
    /// Comma-separated roles allowed to write this column; empty means everyone.
    #[serde(default)]
    pub roles: Option<String>,
    /// Type parameters, e.g. `"lo,hi"` for range fields.
    #[serde(default)]
    pub params: Option<String>,
    #[serde(default)]
    pub order_no: i32,
}

impl ColumnAttribute {
    pub fn new(table: &str, name: &str, field_type: FieldType) -> Self {
        ColumnAttribute {
            db_table_name: table.to_string(),
            name: name.to_string(),
            field_type,
            ..Default::default()
        }
    }

    pub fn is_password(&self) -> bool {
        self.show_type
            .as_deref()
            .map(|s| s.trim().eq_ignore_ascii_case("password"))
            .unwrap_or(false)
    }

    pub fn is_choice(&self) -> bool {
        matches!(
            self.show_type.as_deref().map(|s| s.trim().to_lowercase()).as_deref(),
            Some("radio") | Some("select") | Some("checkbox")
        )
    }

    /// Option values, without labels (`"1:Male|2:Female"` yields `["1", "2"]`).
    pub fn option_values(&self) -> Vec<&str> {
        let Some(options) = self.options.as_deref() else {
            return Vec::new();
        };
        let delimiter = if options.contains('|') { '|' } else { ',' };
        options
            .split(delimiter)
            .map(|o| o.split(':').next().unwrap_or("").trim())
            .filter(|o| !o.is_empty())
            .collect()
    }

    pub fn allowed_roles(&self) -> Vec<&str> {
        self.roles
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .collect()
    }

    /// Effective query style: explicit `query_type`, else derived from the field type.
    pub fn query_style(&self) -> QueryType {
        if let Some(q) = self.query_type {
            return q;
        }
        if self.field_type.is_textual() {
            QueryType::Contains
        } else if self.field_type.is_temporal() {
            QueryType::Range
        } else {
            QueryType::Exact
        }
    }

    // builder-style setters used when assembling static catalogs
    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn editable(mut self) -> Self {
        self.edit_flag = true;
        self
    }

    pub fn searchable(mut self) -> Self {
        self.search_flag = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.is_pri = true;
        self
    }

    pub fn with_len(mut self, len: u32) -> Self {
        self.len = Some(len);
        self
    }

    pub fn with_show_type(mut self, show_type: &str) -> Self {
        self.show_type = Some(show_type.to_string());
        self
    }

    pub fn with_query_type(mut self, query_type: QueryType) -> Self {
        self.query_type = Some(query_type);
        self
    }

    pub fn with_options(mut self, options: &str) -> Self {
        self.options = Some(options.to_string());
        self
    }

    pub fn with_roles(mut self, roles: &str) -> Self {
        self.roles = Some(roles.to_string());
        self
    }

    pub fn with_params(mut self, params: &str) -> Self {
        self.params = Some(params.to_string());
        self
    }
}

/// Check mode of a business rule. Legacy spellings are accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum CheckMode {
    IsExist,
    IsNotExist,
    MultiFieldRepeat,
    IsRange,
    Unknown(String),
}

impl CheckMode {
    pub fn parse(s: &str) -> CheckMode {
        match s.trim() {
            "isExist" | "isExit" => CheckMode::IsExist,
            "isNotExist" | "isNotExit" => CheckMode::IsNotExist,
            "MultiFieldRepeat" | "MutiReapeat" => CheckMode::MultiFieldRepeat,
            "isRange" | "isRang" => CheckMode::IsRange,
            other => CheckMode::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CheckMode::IsExist => "isExist",
            CheckMode::IsNotExist => "isNotExist",
            CheckMode::MultiFieldRepeat => "MultiFieldRepeat",
            CheckMode::IsRange => "isRange",
            CheckMode::Unknown(s) => s.as_str(),
        }
    }
}

impl From<CheckMode> for String {
    fn from(m: CheckMode) -> String {
        m.as_str().to_string()
    }
}

impl<'de> Deserialize<'de> for CheckMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(CheckMode::parse(&s))
    }
}

/// Business rule from `column_check_property`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Host table the rule is attached to.
    pub check_table: String,
    pub check_mode: CheckMode,
    /// Target column, or a comma-separated list for `MultiFieldRepeat`.
    pub check_column: String,
    /// Table counted by existence checks; defaults to the host table.
    #[serde(default)]
    pub target_table: Option<String>,
    /// Where template for existence checks; `%s` marks the submitted value.
    #[serde(default)]
    pub where_str: Option<String>,
    #[serde(default)]
    pub error_msg: Option<String>,
    /// `"lo,hi"` bound for `isRange`.
    #[serde(default)]
    pub params: Option<String>,
    #[serde(default)]
    pub order_no: i32,
}

impl ValidationRule {
    pub fn new(table: &str, mode: CheckMode, column: &str) -> Self {
        ValidationRule {
            check_table: table.to_string(),
            check_mode: mode,
            check_column: column.to_string(),
            target_table: None,
            where_str: None,
            error_msg: None,
            params: None,
            order_no: 0,
        }
    }

    pub fn with_target_table(mut self, table: &str) -> Self {
        self.target_table = Some(table.to_string());
        self
    }

    pub fn with_where(mut self, template: &str) -> Self {
        self.where_str = Some(template.to_string());
        self
    }

    pub fn with_message(mut self, msg: &str) -> Self {
        self.error_msg = Some(msg.to_string());
        self
    }

    pub fn with_params(mut self, params: &str) -> Self {
        self.params = Some(params.to_string());
        self
    }

    pub fn message(&self) -> &str {
        self.error_msg.as_deref().unwrap_or("")
    }
}

/// Declared join from `table_attribute.joins`: `LEFT JOIN table ON main.column = table.ref_column`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    pub name: String,
    pub table: String,
    pub column: String,
    pub ref_column: String,
}

/// Table-level defaults from `table_attribute`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TableConfig {
    pub dbtable: String,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub groupby: Option<String>,
    #[serde(default)]
    pub joins: Vec<JoinSpec>,
    /// Default column list for list queries.
    #[serde(default)]
    pub defin_columns: Option<String>,
}
