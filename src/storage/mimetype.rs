//! Closed mimetype registry for sample artifacts.

use crate::error::StorageError;

pub const APPLICATION_JSON: &str = "application/json";
pub const IMAGE_SVG: &str = "image/svg+xml";
pub const TEXT_PLAIN: &str = "text/plain";

const REGISTRY: &[(&str, &str)] = &[
    (".json", APPLICATION_JSON),
    (".svg", IMAGE_SVG),
    (".dsn", TEXT_PLAIN),
];

/// Resolves the mimetype of `file_path` from its extension.
///
/// Only `.json`, `.svg` and `.dsn` are recognized; anything else fails with
/// `StorageError::UnknownMimetype`.
pub fn mimetype_for(file_path: &str) -> Result<&'static str, StorageError> {
    REGISTRY
        .iter()
        .find(|(ext, _)| file_path.ends_with(ext) && file_path.len() > ext.len())
        .map(|(_, mimetype)| *mimetype)
        .ok_or_else(|| StorageError::UnknownMimetype(file_path.to_string()))
}

/// Whether `file_path` has a recognized extension.
pub fn is_known(file_path: &str) -> bool {
    mimetype_for(file_path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(mimetype_for("unrouted_circuit.json").unwrap(), "application/json");
        assert_eq!(mimetype_for("unrouted_pcb.svg").unwrap(), "image/svg+xml");
        assert_eq!(mimetype_for("unrouted.dsn").unwrap(), "text/plain");
        assert_eq!(
            mimetype_for("outputs/freerouting_routed_circuit.json").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_unknown_extensions() {
        let err = mimetype_for("unrouted.bin").unwrap_err();
        assert_eq!(err.to_string(), "Unknown file type: unrouted.bin");
        assert!(!is_known("notes.txt"));
        assert!(!is_known("UNROUTED.JSON"));
        assert!(!is_known(".json"));
    }
}
