use std::fmt;

use bleterm_transport::{
    Advertisement, DEFAULT_CHARACTERISTIC_ID, DEFAULT_LOCAL_NAME, DEFAULT_SERVICE_ID,
};

use crate::error::{Result, TerminalError};

/// A value that can be set exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOnce<T> {
    value: Option<T>,
}

impl<T> Default for SetOnce<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T> SetOnce<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` if nothing is stored yet.
    ///
    /// On failure the stored value is kept and returned.
    pub fn set(&mut self, value: T) -> std::result::Result<(), &T> {
        match self.value {
            Some(ref existing) => Err(existing),
            None => {
                self.value = Some(value);
                Ok(())
            }
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }
}

/// The identity fields a peripheral advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    DeviceName,
    ServiceId,
    CharacteristicId,
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentityField::DeviceName => "device name",
            IdentityField::ServiceId => "service id",
            IdentityField::CharacteristicId => "characteristic id",
        };
        f.write_str(name)
    }
}

/// Advertised identity. Each field is set-once; unset fields use defaults.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    device_name: SetOnce<String>,
    service_id: SetOnce<String>,
    characteristic_id: SetOnce<String>,
}

impl Identity {
    /// Set one field. Fails if the field was already set.
    pub fn set(&mut self, field: IdentityField, value: impl Into<String>) -> Result<()> {
        let slot = match field {
            IdentityField::DeviceName => &mut self.device_name,
            IdentityField::ServiceId => &mut self.service_id,
            IdentityField::CharacteristicId => &mut self.characteristic_id,
        };
        slot.set(value.into())
            .map_err(|existing| TerminalError::IdentityAlreadySet {
                field,
                existing: existing.clone(),
            })
    }

    pub fn set_device_name(&mut self, name: impl Into<String>) -> Result<()> {
        self.set(IdentityField::DeviceName, name)
    }

    pub fn set_service_id(&mut self, id: impl Into<String>) -> Result<()> {
        self.set(IdentityField::ServiceId, id)
    }

    pub fn set_characteristic_id(&mut self, id: impl Into<String>) -> Result<()> {
        self.set(IdentityField::CharacteristicId, id)
    }

    pub fn device_name(&self) -> &str {
        self.device_name
            .get()
            .map_or(DEFAULT_LOCAL_NAME, String::as_str)
    }

    pub fn service_id(&self) -> &str {
        self.service_id
            .get()
            .map_or(DEFAULT_SERVICE_ID, String::as_str)
    }

    pub fn characteristic_id(&self) -> &str {
        self.characteristic_id
            .get()
            .map_or(DEFAULT_CHARACTERISTIC_ID, String::as_str)
    }

    /// Whether `field` was explicitly set.
    pub fn is_set(&self, field: IdentityField) -> bool {
        match field {
            IdentityField::DeviceName => self.device_name.is_set(),
            IdentityField::ServiceId => self.service_id.is_set(),
            IdentityField::CharacteristicId => self.characteristic_id.is_set(),
        }
    }

    /// Build the advertisement for an attribute of `value_size` bytes.
    pub fn advertisement(&self, value_size: usize) -> Advertisement {
        Advertisement {
            local_name: self.device_name().to_string(),
            service_id: self.service_id().to_string(),
            characteristic_id: self.characteristic_id().to_string(),
            value_size,
        }
    }
}
