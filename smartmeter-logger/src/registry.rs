//! OBIS code registry
//!
//! Static table mapping the OBIS addresses a meter reports to the stable
//! field names written to the store. Lookups are exact: identifiers are
//! compared as given (lowercase hex, 12 characters), names are case-sensitive.

use std::fmt;

/// One measurable quantity a meter can report
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    /// OBIS address as lowercase hex, e.g. `0100010800ff`
    pub identifier: &'static str,
    /// Output key used for the store field
    pub display_name: &'static str,
    /// Human-readable label
    pub description: &'static str,
}

impl FieldDescriptor {
    pub const fn new(
        identifier: &'static str,
        display_name: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            identifier,
            display_name,
            description,
        }
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.identifier)
    }
}

pub const GERAETEEINZELIDENTIFIKATION: FieldDescriptor = FieldDescriptor::new(
    "0100000009ff",
    "GERAETEEINZELIDENTIFIKATION",
    "Geräteeinzelidentifikation",
);
pub const ZAEHLERSTAND_TOTAL_BEZUG: FieldDescriptor = FieldDescriptor::new(
    "0100010800ff",
    "ZAEHLERSTAND_TOTAL_BEZUG",
    "Zählerstand Total Bezug",
);
pub const ZAEHLERSTAND_TARIF_1_BEZUG: FieldDescriptor = FieldDescriptor::new(
    "0100010801ff",
    "ZAEHLERSTAND_TARIF_1_BEZUG",
    "Zählerstand Tarif 1 Bezug",
);
pub const ZAEHLERSTAND_TARIF_2_BEZUG: FieldDescriptor = FieldDescriptor::new(
    "0100010802ff",
    "ZAEHLERSTAND_TARIF_2_BEZUG",
    "Zählerstand Tarif 2 Bezug",
);
pub const ZAEHLERSTAND_TOTAL_EINSPEISUNG: FieldDescriptor = FieldDescriptor::new(
    "0100020800ff",
    "ZAEHLERSTAND_TOTAL_EINSPEISUNG",
    "Zählerstand Total Einspeisung",
);
pub const ZAEHLERSTAND_TARIF_1_EINSPEISUNG: FieldDescriptor = FieldDescriptor::new(
    "0100020801ff",
    "ZAEHLERSTAND_TARIF_1_EINSPEISUNG",
    "Zählerstand Tarif 1 Einspeisung",
);
pub const ZAEHLERSTAND_TARIF_2_EINSPEISUNG: FieldDescriptor = FieldDescriptor::new(
    "0100020802ff",
    "ZAEHLERSTAND_TARIF_2_EINSPEISUNG",
    "Zählerstand Tarif 2 Einspeisung",
);
pub const AKTUELLE_WIRKLEISTUNG: FieldDescriptor = FieldDescriptor::new(
    "0100100700ff",
    "AKTUELLE_WIRKLEISTUNG",
    "aktuelle Wirkleistung",
);
pub const HERSTELLER_IDENTIFIKATION: FieldDescriptor = FieldDescriptor::new(
    "8181c78203ff",
    "HERSTELLER_IDENTIFIKATION",
    "Hersteller-Identifikation",
);
pub const OEFFENTLICHER_SCHLUESSEL: FieldDescriptor = FieldDescriptor::new(
    "8181c78205ff",
    "OEFFENTLICHER_SCHLUESSEL",
    "Öffentlicher Schlüssel",
);

static REGISTRY: [FieldDescriptor; 10] = [
    GERAETEEINZELIDENTIFIKATION,
    ZAEHLERSTAND_TOTAL_BEZUG,
    ZAEHLERSTAND_TARIF_1_BEZUG,
    ZAEHLERSTAND_TARIF_2_BEZUG,
    ZAEHLERSTAND_TOTAL_EINSPEISUNG,
    ZAEHLERSTAND_TARIF_1_EINSPEISUNG,
    ZAEHLERSTAND_TARIF_2_EINSPEISUNG,
    AKTUELLE_WIRKLEISTUNG,
    HERSTELLER_IDENTIFIKATION,
    OEFFENTLICHER_SCHLUESSEL,
];

/// All known descriptors, in table order
pub fn all() -> &'static [FieldDescriptor] {
    &REGISTRY
}

/// Find a descriptor by its OBIS identifier
pub fn lookup_by_identifier(identifier: &str) -> Option<&'static FieldDescriptor> {
    REGISTRY.iter().find(|d| d.identifier == identifier)
}

/// Find a descriptor by its output key
pub fn lookup_by_name(name: &str) -> Option<&'static FieldDescriptor> {
    REGISTRY.iter().find(|d| d.display_name == name)
}

/// Find a descriptor by its human-readable label
pub fn lookup_by_description(description: &str) -> Option<&'static FieldDescriptor> {
    REGISTRY.iter().find(|d| d.description == description)
}

/// Resolve a configuration key, trying the identifier first and then the name
pub fn resolve(key: &str) -> Option<&'static FieldDescriptor> {
    lookup_by_identifier(key).or_else(|| lookup_by_name(key))
}
