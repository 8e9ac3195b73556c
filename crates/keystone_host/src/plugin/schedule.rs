//! Schedule identifiers for tick-based plugin updates.

use core::any::TypeId;

/// Identifier for a tick schedule, derived from a marker type.
///
/// Any `'static` type can serve as a schedule marker. The host ticks a
/// schedule with [`Host::tick()`](crate::host::Host::tick); plugins that
/// listed it in [`Plugin::tick_schedules()`](super::Plugin::tick_schedules)
/// receive [`Plugin::update()`](super::Plugin::update).
///
/// # Example
///
/// ```
/// # use keystone_host::plugin::ScheduleId;
/// pub struct EveryTick;
///
/// let schedule = ScheduleId::of::<EveryTick>();
/// assert!(schedule.type_name().contains("EveryTick"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleId {
    type_id: TypeId,
    type_name: &'static str,
}

impl ScheduleId {
    /// Creates a `ScheduleId` for the given schedule marker type.
    #[must_use]
    pub fn of<S: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<S>(),
            type_name: core::any::type_name::<S>(),
        }
    }

    /// Returns the underlying `TypeId`.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the type name for debugging.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Marker trait for schedule types.
///
/// [`ScheduleId::of`] accepts any `'static` type; `Schedule` is a naming
/// convention that lets schedule markers be discovered in docs.
pub trait Schedule: 'static {
    /// Returns the identifier of this schedule.
    fn id() -> ScheduleId
    where
        Self: Sized,
    {
        ScheduleId::of::<Self>()
    }
}
