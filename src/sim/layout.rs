// Buffer layout derived from the configured object attributes
// Slot 0 is world time, then every object's attributes in order

use std::ops::Range;

use super::SimulationError;
use crate::config::ObjectAttributes;

/// Number of `f64` values one attribute occupies, `None` if unknown
pub fn attribute_size(attribute: &str) -> Option<usize> {
    let size = match attribute {
        "position" | "joint_position" | "force" | "torque" => 3,
        "quaternion" | "joint_quaternion" => 4,
        "relative_velocity" | "odometric_velocity" => 6,
        "joint_rvalue"
        | "joint_tvalue"
        | "joint_linear_velocity"
        | "joint_angular_velocity"
        | "joint_force"
        | "joint_torque"
        | "cmd_joint_rvalue"
        | "cmd_joint_tvalue"
        | "cmd_joint_linear_velocity"
        | "cmd_joint_angular_velocity"
        | "cmd_joint_force"
        | "cmd_joint_torque" => 1,
        _ => return None,
    };
    Some(size)
}

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    object: String,
    attribute: String,
    range: Range<usize>,
}

/// Where each (object, attribute) lives inside one frame buffer
#[derive(Debug, Clone, PartialEq)]
pub struct BufferLayout {
    slots: Vec<Slot>,
    len: usize,
}

impl BufferLayout {
    pub fn from_objects(objects: &ObjectAttributes) -> Result<Self, SimulationError> {
        let mut slots = Vec::new();
        // world time
        let mut offset = 1;

        for (object, attributes) in objects {
            for attribute in attributes {
                let size =
                    attribute_size(attribute).ok_or_else(|| SimulationError::UnknownAttribute {
                        object: object.clone(),
                        attribute: attribute.clone(),
                    })?;
                slots.push(Slot {
                    object: object.clone(),
                    attribute: attribute.clone(),
                    range: offset..offset + size,
                });
                offset += size;
            }
        }

        Ok(Self { slots, len: offset })
    }

    /// Total number of values, world time included
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn range_of(&self, object: &str, attribute: &str) -> Option<Range<usize>> {
        self.slots
            .iter()
            .find(|slot| slot.object == object && slot.attribute == attribute)
            .map(|slot| slot.range.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objects(entries: &[(&str, &[&str])]) -> ObjectAttributes {
        entries
            .iter()
            .map(|(object, attributes)| {
                (
                    object.to_string(),
                    attributes.iter().map(|a| a.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_empty_layout_holds_world_time_only() {
        let layout = BufferLayout::from_objects(&ObjectAttributes::new()).unwrap();
        assert_eq!(layout.len(), 1);
    }

    #[test]
    fn test_layout_offsets_follow_object_order() {
        let layout = BufferLayout::from_objects(&objects(&[
            ("panda_hand", &["position", "quaternion"][..]),
            ("panda_joint1", &["joint_rvalue"][..]),
        ]))
        .unwrap();

        assert_eq!(layout.len(), 1 + 3 + 4 + 1);
        assert_eq!(layout.range_of("panda_hand", "position"), Some(1..4));
        assert_eq!(layout.range_of("panda_hand", "quaternion"), Some(4..8));
        assert_eq!(layout.range_of("panda_joint1", "joint_rvalue"), Some(8..9));
        assert_eq!(layout.range_of("panda_joint1", "position"), None);
    }

    #[test]
    fn test_unknown_attribute_is_rejected() {
        let err = BufferLayout::from_objects(&objects(&[("cube", &["colour"][..])])).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::UnknownAttribute { ref object, ref attribute }
                if object == "cube" && attribute == "colour"
        ));
    }

    #[test]
    fn test_velocity_and_wrench_sizes() {
        assert_eq!(attribute_size("odometric_velocity"), Some(6));
        assert_eq!(attribute_size("force"), Some(3));
        assert_eq!(attribute_size("cmd_joint_torque"), Some(1));
    }
}
