use std::collections::HashMap;

/// Identifiers for the per-frame tunables a request may override.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ControlId {
    /// Enable or disable the automatic white balance algorithm.
    AwbEnable,
    /// Manual red/blue colour gains, disabling automatic estimation for the
    /// frame they apply to.
    ColourGains,
    /// Sensor exposure time in microseconds.
    ExposureTime,
    /// Sensor analogue gain as a multiplier.
    AnalogueGain,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ControlValue {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    FloatPair(f32, f32),
}

/// A per-request override map of tunables to values.
///
/// Controls latched into a request apply to exactly the frame that request
/// captures; unset controls leave the algorithms' current state in effect.
#[derive(Clone, Debug, Default)]
pub struct ControlList {
    values: HashMap<ControlId, ControlValue>,
}

impl ControlList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: ControlId, value: ControlValue) {
        self.values.insert(id, value);
    }

    pub fn get(&self, id: ControlId) -> Option<&ControlValue> {
        self.values.get(&id)
    }

    pub fn contains(&self, id: ControlId) -> bool {
        self.values.contains_key(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ControlId, &ControlValue)> {
        self.values.iter()
    }

    pub fn get_bool(&self, id: ControlId) -> Option<bool> {
        match self.values.get(&id) {
            Some(ControlValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_float_pair(&self, id: ControlId) -> Option<(f32, f32)> {
        match self.values.get(&id) {
            Some(ControlValue::FloatPair(a, b)) => Some((*a, *b)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get() {
        let mut controls = ControlList::new();
        assert!(controls.is_empty());

        controls.set(ControlId::AwbEnable, ControlValue::Bool(false));
        controls.set(ControlId::ColourGains, ControlValue::FloatPair(1.5, 2.0));

        assert_eq!(controls.len(), 2);
        assert_eq!(controls.get_bool(ControlId::AwbEnable), Some(false));
        assert_eq!(
            controls.get_float_pair(ControlId::ColourGains),
            Some((1.5, 2.0))
        );
        assert!(!controls.contains(ControlId::ExposureTime));
    }

    #[test]
    fn test_typed_getter_mismatch() {
        let mut controls = ControlList::new();
        controls.set(ControlId::AwbEnable, ControlValue::Int32(1));
        assert_eq!(controls.get_bool(ControlId::AwbEnable), None);
    }
}
