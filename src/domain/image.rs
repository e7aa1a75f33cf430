use super::error::{HarnessError, Result};
use std::path::Path;

/// Derives `name:version` from the build context directory name.
///
/// Only ASCII letters survive and are lower-cased, so `Pu_Re-2` becomes `pure:0.1`
/// for schema version `0.1`.
pub fn derive_image_name(context: &Path, schema_version: &str) -> Result<String> {
    let dir_name = context
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name: String = dir_name
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if name.is_empty() {
        return Err(HarnessError::Configuration(format!(
            "cannot derive an image name from {:?}; pass one explicitly",
            context
        )));
    }

    Ok(format!("{name}:{schema_version}"))
}

/// Fails unless `path` is a directory holding the build descriptor.
pub fn validate_context(path: &Path, descriptor: &str) -> Result<()> {
    if !path.is_dir() {
        return Err(HarnessError::Configuration(format!(
            "{:?} is not a directory containing a detector",
            path
        )));
    }

    if !path.join(descriptor).is_file() {
        return Err(HarnessError::Configuration(format!(
            "{:?} does not contain a {descriptor}",
            path
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    #[test]
    fn keeps_only_lowercased_ascii_letters() {
        let name = derive_image_name(Path::new("/detectors/Pu_Re-2"), "0.1").unwrap();
        assert_eq!(name, "pure:0.1");
    }

    #[test]
    fn naming_is_deterministic() {
        let path = PathBuf::from("detectors/ElSe");
        assert_eq!(
            derive_image_name(&path, "0.1").unwrap(),
            derive_image_name(&path, "0.1").unwrap()
        );
    }

    #[test]
    fn uses_the_schema_version_as_tag() {
        let name = derive_image_name(Path::new("Swirski"), "0.2").unwrap();
        assert_eq!(name, "swirski:0.2");
    }

    #[test]
    fn rejects_names_without_letters() {
        let err = derive_image_name(Path::new("/tmp/1234"), "0.1").unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
    }

    #[test]
    fn context_requires_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_context(dir.path(), "Dockerfile").unwrap_err();
        assert!(err.to_string().contains("does not contain a Dockerfile"));

        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        assert!(validate_context(dir.path(), "Dockerfile").is_ok());
    }

    #[test]
    fn context_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("pure:0.1");
        fs::write(&file, "").unwrap();

        let err = validate_context(&file, "Dockerfile").unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
    }
}
