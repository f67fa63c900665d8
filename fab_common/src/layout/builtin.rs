//! Layouts shipped with the workspace.
//!
//! Each observed firmware revision is its own layout; deployments pick one
//! by id (`<kind>/<revision>`) at startup.

use super::registry::{LayoutError, RegisterLayout};

/// Built-in layout ids and their TOML definitions.
pub const BUILTIN_LAYOUTS: &[(&str, &str)] = &[
    (
        "gas_cabinet/v1",
        include_str!("../../layouts/gas_cabinet_v1.toml"),
    ),
    (
        "gas_cabinet/v2",
        include_str!("../../layouts/gas_cabinet_v2.toml"),
    ),
    ("stocker/v1", include_str!("../../layouts/stocker_v1.toml")),
];

/// Ids of every built-in layout.
pub fn builtin_layout_ids() -> impl Iterator<Item = &'static str> {
    BUILTIN_LAYOUTS.iter().map(|(id, _)| *id)
}

/// Build a built-in layout by id.
///
/// # Errors
///
/// `LayoutError::UnknownLayout` for an unrecognised id; any construction
/// error of the embedded definition otherwise.
pub fn builtin_layout(id: &str) -> Result<RegisterLayout, LayoutError> {
    let (_, source) = BUILTIN_LAYOUTS
        .iter()
        .find(|(candidate, _)| *candidate == id)
        .ok_or_else(|| LayoutError::UnknownLayout { id: id.to_string() })?;
    RegisterLayout::from_toml(source)
}
