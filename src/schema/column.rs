use crate::validate::Validator;
use basemodel_types::{ColumnType, StorageClass};
use serde::Deserialize;

/// One physical column of a user-defined table.
#[derive(Debug, Clone, Deserialize)]
pub struct Column {
    /// Physical name in the database
    #[serde(alias = "cn")]
    pub name: String,
    /// User-facing name; defaults to the physical name
    #[serde(alias = "_cn", default)]
    pub alias: String,
    #[serde(alias = "uidt", default)]
    pub kind: ColumnType,
    #[serde(alias = "pk", default)]
    pub primary_key: bool,
    #[serde(alias = "ai", default)]
    pub auto_increment: bool,
    /// Display ("title") column
    #[serde(alias = "pv", default)]
    pub primary_value: bool,
    #[serde(default)]
    pub validators: Vec<Validator>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            kind,
            primary_key: false,
            auto_increment: false,
            primary_value: false,
            validators: Vec::new(),
        }
    }

    /// Auto-incrementing integer primary key.
    pub fn id(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Id)
            .primary_key()
            .auto_increment()
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn primary_value(mut self) -> Self {
        self.primary_value = true;
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    #[inline]
    pub fn class(&self) -> StorageClass {
        self.kind.storage_class()
    }

    /// Whether `name` refers to this column by alias or physical name.
    #[inline]
    pub fn answers_to(&self, name: &str) -> bool {
        self.alias == name || self.name == name
    }
}
