//! Validator and applier chains.
//!
//! # Responsibilities
//! - Run every validator for a name and collect all reported problems
//! - Run appliers in order, stopping at the first failure
//!
//! # Design Decisions
//! - Validators see the new value read-only and never short-circuit, so a
//!   single reload reports every problem at once
//! - Appliers may depend on earlier appliers, so the first error stops the
//!   chain; side effects of appliers that already ran are not undone
//! - The current value is `None` on the initial load

use crate::error::BoxError;

/// Inspects a prospective configuration and reports zero or more problems.
pub type Validator<C> = Box<dyn Fn(Option<&C>, &C) -> Vec<BoxError> + Send + Sync>;

/// Commits side effects for an accepted configuration.
///
/// The new value is not published yet, so an applier may stamp derived
/// fields onto it.
pub type Applier<C> = Box<dyn Fn(Option<&C>, &mut C) -> Result<(), BoxError> + Send + Sync>;

/// Box a closure as a [`Validator`].
pub fn validator<C, F>(f: F) -> Validator<C>
where
    F: Fn(Option<&C>, &C) -> Vec<BoxError> + Send + Sync + 'static,
{
    Box::new(f)
}

/// Box a closure as an [`Applier`].
pub fn applier<C, F>(f: F) -> Applier<C>
where
    F: Fn(Option<&C>, &mut C) -> Result<(), BoxError> + Send + Sync + 'static,
{
    Box::new(f)
}

/// Run the full chain and return every error reported by any validator.
pub fn run_validators<C>(validators: &[Validator<C>], current: Option<&C>, new: &C) -> Vec<BoxError> {
    validators
        .iter()
        .flat_map(|validator| validator(current, new))
        .collect()
}

/// Run appliers in registration order until one fails.
pub fn run_appliers<C>(
    appliers: &[Applier<C>],
    current: Option<&C>,
    new: &mut C,
) -> Result<(), BoxError> {
    for applier in appliers {
        applier(current, &mut *new)?;
    }
    Ok(())
}
