//! Core types and trait definitions for the Docket personal-data governance
//! core.
//!
//! No HTTP or database dependencies; every other crate in the workspace
//! depends on this one.

pub mod audit;
pub mod consent;
pub mod dependent;
pub mod erasure;
pub mod error;
pub mod export;
pub mod store;
pub mod subject;

pub use error::{Error, Result};

/// Parse a stored discriminant with `strum`, mapping failures to
/// [`Error::UnknownVariant`].
pub(crate) fn parse_variant<T>(kind: &'static str, value: &str) -> Result<T>
where
  T: std::str::FromStr,
{
  value.parse().map_err(|_| Error::UnknownVariant {
    kind,
    value: value.to_owned(),
  })
}
