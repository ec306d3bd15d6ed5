//! UI-level column kinds.

/// The user-facing kind of a column.
///
/// Kinds decide how textual filter values are coerced before binding and how
/// cells are serialized on export. Physical storage types are the database's
/// business; several kinds share one storage class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColumnType {
    #[cfg_attr(feature = "serde", serde(rename = "ID"))]
    Id,
    ForeignKey,
    #[default]
    SingleLineText,
    LongText,
    Email,
    #[cfg_attr(feature = "serde", serde(rename = "URL"))]
    Url,
    PhoneNumber,
    SingleSelect,
    MultiSelect,
    Number,
    Decimal,
    Currency,
    Percent,
    Rating,
    Duration,
    Checkbox,
    Date,
    DateTime,
    Time,
    Attachment,
    #[cfg_attr(feature = "serde", serde(rename = "JSON"))]
    Json,
}

/// Storage class a [`ColumnType`] binds as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    Integer,
    Real,
    Boolean,
    Text,
    Json,
}

impl ColumnType {
    /// Storage class values of this kind are coerced to.
    #[must_use]
    pub const fn storage_class(&self) -> StorageClass {
        match self {
            ColumnType::Id
            | ColumnType::ForeignKey
            | ColumnType::Number
            | ColumnType::Rating
            | ColumnType::Duration => StorageClass::Integer,
            ColumnType::Decimal | ColumnType::Currency | ColumnType::Percent => {
                StorageClass::Real
            }
            ColumnType::Checkbox => StorageClass::Boolean,
            ColumnType::Attachment | ColumnType::Json => StorageClass::Json,
            _ => StorageClass::Text,
        }
    }

    /// Returns `true` for kinds whose values are numbers.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self.storage_class(),
            StorageClass::Integer | StorageClass::Real
        )
    }
}
