//! Field extraction
//!
//! Maps the raw entries of a frame onto the requested registry descriptors.

use crate::error::{Error, Result};
use crate::registry::{self, FieldDescriptor};
use crate::sml::{FieldValue, RawFrame};

/// Ordered set of descriptors to pull out of every frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionRequest {
    fields: Vec<&'static FieldDescriptor>,
}

impl ExtractionRequest {
    /// Build from descriptors, dropping repeats (first position kept)
    pub fn new<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = &'static FieldDescriptor>,
    {
        let mut request = Self::default();
        for field in fields {
            request.push(field);
        }
        request
    }

    /// Build from configuration keys (OBIS identifier or display name)
    ///
    /// Unknown keys are logged and skipped. Fails only if nothing resolves.
    pub fn from_keys<S: AsRef<str>>(keys: &[S]) -> Result<Self> {
        let mut request = Self::default();
        for key in keys {
            let key = key.as_ref();
            match registry::resolve(key) {
                Some(field) => request.push(field),
                None => log::warn!("{}, not recorded", Error::UnknownField(key.to_string())),
            }
        }
        if request.is_empty() {
            return Err(Error::Config(
                "no known fields configured for recording".to_string(),
            ));
        }
        Ok(request)
    }

    fn push(&mut self, field: &'static FieldDescriptor) {
        if !self.contains(field.identifier) {
            self.fields.push(field);
        }
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.fields.iter().any(|f| f.identifier == identifier)
    }

    pub fn fields(&self) -> &[&'static FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Values found in one frame, in request order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementSet {
    values: Vec<(&'static FieldDescriptor, FieldValue)>,
}

impl MeasurementSet {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Value recorded for an OBIS identifier
    pub fn get(&self, identifier: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(d, _)| d.identifier == identifier)
            .map(|(_, v)| v)
    }

    /// Value recorded for a display name
    pub fn get_by_name(&self, display_name: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(d, _)| d.display_name == display_name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static FieldDescriptor, &FieldValue)> {
        self.values.iter().map(|(d, v)| (*d, v))
    }
}

/// Pull the requested fields out of a frame
///
/// The first occurrence of an identifier wins. Identifiers not requested are
/// ignored; requested ones missing from the frame are left out.
pub fn extract<F: RawFrame + ?Sized>(frame: &F, wanted: &ExtractionRequest) -> MeasurementSet {
    let mut slots: Vec<Option<FieldValue>> = vec![None; wanted.len()];

    for entry in frame.entries() {
        let Some(index) = wanted
            .fields
            .iter()
            .position(|f| f.identifier == entry.identifier)
        else {
            continue;
        };
        if slots[index].is_none() {
            slots[index] = Some(entry.value);
        }
    }

    let values = wanted
        .fields
        .iter()
        .zip(slots)
        .filter_map(|(field, value)| value.map(|v| (*field, v)))
        .collect();
    MeasurementSet { values }
}
