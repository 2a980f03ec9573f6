//! Queue family selection.

use ash::vk;

/// Which queue capabilities a context needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRequirements {
    pub graphics: bool,
    pub present: bool,
}

/// Queue family indices found on a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
    pub compute: Option<u32>,
}

impl QueueFamilyIndices {
    /// Whether every required family was found. Compute is always required.
    pub fn is_complete(&self, requirements: QueueRequirements) -> bool {
        self.compute.is_some()
            && (!requirements.graphics || self.graphics.is_some())
            && (!requirements.present || self.present.is_some())
    }

    /// Distinct families to create queues on, in ascending order.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families: Vec<u32> = [self.graphics, self.present, self.compute]
            .into_iter()
            .flatten()
            .collect();
        families.sort_unstable();
        families.dedup();
        families
    }
}

/// Find graphics, present and compute families.
///
/// Present prefers the graphics family so a single queue can do both.
/// Compute prefers a dedicated family without graphics.
pub fn find_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: F,
) -> QueueFamilyIndices
where
    F: FnMut(u32) -> bool,
{
    let mut indices = QueueFamilyIndices::default();
    let mut shared_compute = None;

    for (i, family) in (0u32..).zip(families) {
        if family.queue_count == 0 {
            continue;
        }
        let flags = family.queue_flags;

        if flags.contains(vk::QueueFlags::GRAPHICS) && indices.graphics.is_none() {
            indices.graphics = Some(i);
        }

        if flags.contains(vk::QueueFlags::COMPUTE) {
            if !flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.compute.get_or_insert(i);
            } else {
                shared_compute.get_or_insert(i);
            }
        }
    }

    indices.compute = indices.compute.or(shared_compute);

    indices.present = match indices.graphics {
        Some(graphics) if supports_present(graphics) => Some(graphics),
        _ => (0u32..)
            .zip(families)
            .filter(|(_, family)| family.queue_count > 0)
            .map(|(i, _)| i)
            .find(|&i| supports_present(i)),
    };

    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    const GRAPHICS: vk::QueueFlags = vk::QueueFlags::from_raw(
        vk::QueueFlags::GRAPHICS.as_raw()
            | vk::QueueFlags::COMPUTE.as_raw()
            | vk::QueueFlags::TRANSFER.as_raw(),
    );

    #[test]
    fn single_universal_family() {
        let families = [family(GRAPHICS)];
        let indices = find_queue_families(&families, |_| true);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
        assert_eq!(indices.compute, Some(0));
        assert_eq!(indices.unique_families(), vec![0]);
    }

    #[test]
    fn dedicated_compute_is_preferred() {
        let families = [family(GRAPHICS), family(vk::QueueFlags::COMPUTE)];
        let indices = find_queue_families(&families, |_| true);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.compute, Some(1));
        assert_eq!(indices.unique_families(), vec![0, 1]);
    }

    #[test]
    fn present_falls_back_to_another_family() {
        let families = [
            family(GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = find_queue_families(&families, |i| i == 2);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(2));
    }

    #[test]
    fn empty_families_are_ignored() {
        let mut empty = family(GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(GRAPHICS)];
        let indices = find_queue_families(&families, |_| true);
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(1));
    }

    #[test]
    fn completeness_depends_on_requirements() {
        let families = [family(vk::QueueFlags::COMPUTE)];
        let indices = find_queue_families(&families, |_| false);

        let headless = QueueRequirements {
            graphics: false,
            present: false,
        };
        let windowed = QueueRequirements {
            graphics: true,
            present: true,
        };
        assert!(indices.is_complete(headless));
        assert!(!indices.is_complete(windowed));
    }
}
