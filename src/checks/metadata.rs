use super::{Check, CheckError, JsonKind, assert_equal, assert_in, assert_kind};
use crate::domain::{MetaData, Result};
use crate::services::Container;
use tracing::debug;

const METADATA_FIELDS: [&str; 5] = [
    "name",
    "additional_information",
    "authors",
    "license",
    "prediction",
];

/// `GET /` answers 200 with every metadata field.
pub struct MetadataCheck;

impl Check for MetadataCheck {
    fn name(&self) -> &str {
        "Metadata"
    }

    fn run(&self, container: &mut Container) -> Result<(), CheckError> {
        let response = container.get("/")?;
        assert_equal(response.status, 200, "GET /")?;

        let body = response.json()?;
        for field in METADATA_FIELDS {
            assert_in(field, &body, "metadata")?;
        }
        Ok(())
    }
}

/// The self-description parses into a typed [`MetaData`].
pub struct ConfigCheck;

impl Check for ConfigCheck {
    fn name(&self) -> &str {
        "Config"
    }

    fn run(&self, container: &mut Container) -> Result<(), CheckError> {
        let response = container.get("/")?;
        assert_kind(&response.json()?, &[JsonKind::Object], "GET /")?;

        let metadata: MetaData = response.parse()?;
        debug!("{} reports prediction {}", metadata.name, metadata.prediction);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ContainerSettings;
    use crate::infra::{HttpClient, PortAllocator};
    use crate::test_support::{MockRuntime, StubRequest, StubResponse, detector_service};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn container(runtime: MockRuntime) -> Container {
        let mut container = Container::new(
            Arc::new(runtime),
            HttpClient::new(Duration::from_secs(5)).unwrap(),
            ContainerSettings {
                image: "pure:0.1".into(),
                host_port: PortAllocator::new().allocate().unwrap(),
                container_port: 8080,
                remove_on_exit: true,
            },
        );
        container.start().unwrap();
        container
    }

    #[test]
    fn complete_metadata_passes() {
        let mut container = container(MockRuntime::with_service(detector_service()));
        MetadataCheck.run(&mut container).unwrap();
        ConfigCheck.run(&mut container).unwrap();
    }

    #[test]
    fn missing_field_fails_the_assertion() {
        let runtime = MockRuntime::with_service(Arc::new(|_: &StubRequest| {
            StubResponse::json(200, json!({"name": "partial", "authors": []}))
        }));
        let mut container = container(runtime);

        match MetadataCheck.run(&mut container) {
            Err(CheckError::Assertion(failure)) => {
                assert!(failure.message.contains("additional_information"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn non_json_metadata_is_a_harness_error() {
        let runtime = MockRuntime::with_service(Arc::new(|_: &StubRequest| StubResponse::text(200, "hello")));
        let mut container = container(runtime);

        let err = ConfigCheck.run(&mut container).unwrap_err();
        assert!(matches!(err, CheckError::Harness(_)));
    }
}
