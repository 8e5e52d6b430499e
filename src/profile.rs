//! Resolving message and field numbers against a profile.
//!
//! The profile is the vendor-defined mapping from numeric identifiers to
//! semantic names, scaling, and units. It is supplied to the message
//! decoder as an injected lookup capability, so scans run equally well
//! against the full vendor table, a synthetic table, or no table at all
//! (undocumented messages stay numbered-but-unnamed).

use std::collections::HashMap;

/// Descriptor for a documented field: its name, scaling, and units.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    /// Divisor applied to raw integers; 1 leaves them untouched.
    pub scale: f64,
    /// Subtracted after scaling.
    pub offset: f64,
    pub units: Option<String>,
}

impl FieldDescriptor {
    /// A descriptor with no scaling and no units.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            scale: 1.0,
            offset: 0.0,
            units: None,
        }
    }

    /// Apply a scale and offset to raw integer values.
    pub fn scaled(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    /// Attach units to decoded values.
    pub fn units(mut self, units: &str) -> Self {
        self.units = Some(units.to_owned());
        self
    }

    /// Whether decoded values need a scale or offset applied.
    pub fn is_scaled(&self) -> bool {
        self.scale != 1.0 || self.offset != 0.0
    }
}

/// Read-only lookup from message and field numbers to semantics.
pub trait Profile {
    /// Name for a global message number, if documented.
    fn message(&self, global: u16) -> Option<&str>;

    /// Descriptor for a field of a message, if documented.
    fn field(&self, global: u16, number: u8) -> Option<&FieldDescriptor>;
}

/// A map-backed profile, built entry by entry.
///
/// The empty table is a valid profile under which every message passes
/// through unnamed.
#[derive(Debug, Clone, Default)]
pub struct TableProfile {
    messages: HashMap<u16, String>,
    fields: HashMap<(u16, u8), FieldDescriptor>,
}

impl TableProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name a global message number.
    pub fn with_message(mut self, global: u16, name: &str) -> Self {
        self.messages.insert(global, name.to_owned());
        self
    }

    /// Describe a field of a message.
    pub fn with_field(mut self, global: u16, number: u8, descriptor: FieldDescriptor) -> Self {
        self.fields.insert((global, number), descriptor);
        self
    }
}

impl Profile for TableProfile {
    fn message(&self, global: u16) -> Option<&str> {
        self.messages.get(&global).map(String::as_str)
    }

    fn field(&self, global: u16, number: u8) -> Option<&FieldDescriptor> {
        self.fields.get(&(global, number))
    }
}

/// A small built-in table covering the common activity messages, enough
/// to exercise the decoder without the vendor specification.
pub fn minimal() -> TableProfile {
    let timestamp = || FieldDescriptor::new("timestamp").units("s");

    TableProfile::new()
        .with_message(0, "file_id")
        .with_field(0, 0, FieldDescriptor::new("type"))
        .with_field(0, 1, FieldDescriptor::new("manufacturer"))
        .with_field(0, 2, FieldDescriptor::new("product"))
        .with_field(0, 3, FieldDescriptor::new("serial_number"))
        .with_field(0, 4, FieldDescriptor::new("time_created"))
        .with_message(18, "session")
        .with_field(18, 253, timestamp())
        .with_field(18, 5, FieldDescriptor::new("sport"))
        .with_field(18, 7, FieldDescriptor::new("total_elapsed_time").scaled(1000.0, 0.0).units("s"))
        .with_field(18, 9, FieldDescriptor::new("total_distance").scaled(100.0, 0.0).units("m"))
        .with_message(19, "lap")
        .with_field(19, 253, timestamp())
        .with_field(19, 7, FieldDescriptor::new("total_elapsed_time").scaled(1000.0, 0.0).units("s"))
        .with_message(20, "record")
        .with_field(20, 253, timestamp())
        .with_field(20, 0, FieldDescriptor::new("position_lat").units("semicircles"))
        .with_field(20, 1, FieldDescriptor::new("position_long").units("semicircles"))
        .with_field(20, 2, FieldDescriptor::new("altitude").scaled(5.0, 500.0).units("m"))
        .with_field(20, 3, FieldDescriptor::new("heart_rate").units("bpm"))
        .with_field(20, 4, FieldDescriptor::new("cadence").units("rpm"))
        .with_field(20, 5, FieldDescriptor::new("distance").scaled(100.0, 0.0).units("m"))
        .with_field(20, 6, FieldDescriptor::new("speed").scaled(1000.0, 0.0).units("m/s"))
        .with_field(20, 7, FieldDescriptor::new("power").units("watts"))
        .with_field(20, 13, FieldDescriptor::new("temperature").units("C"))
        .with_message(21, "event")
        .with_field(21, 253, timestamp())
        .with_field(21, 0, FieldDescriptor::new("event"))
        .with_field(21, 1, FieldDescriptor::new("event_type"))
        .with_message(23, "device_info")
        .with_field(23, 253, timestamp())
        .with_field(23, 1, FieldDescriptor::new("manufacturer"))
        .with_field(23, 4, FieldDescriptor::new("product"))
        .with_message(34, "activity")
        .with_field(34, 253, timestamp())
        .with_field(34, 1, FieldDescriptor::new("num_sessions"))
}
