use fc_local_models::{FunctionSpec, LocalError, Runtime};

pub const IMAGE_REPOSITORY: &str = "aliyunfc/runtime";

fn image_tag(runtime: Runtime) -> Option<&'static str> {
    match runtime {
        Runtime::Python3 => Some("python3.6"),
        Runtime::CustomContainer => None,
        other => Some(other.as_str()),
    }
}

/// `aliyunfc/runtime-{tag}:{version}`, or the function's own image for custom containers.
pub fn resolve_image(function: &FunctionSpec, version: &str) -> Result<String, LocalError> {
    match image_tag(function.runtime) {
        Some(tag) => Ok(format!("{IMAGE_REPOSITORY}-{tag}:{version}")),
        None => function
            .custom_container
            .as_ref()
            .map(|c| c.image.clone())
            .filter(|image| !image.is_empty())
            .ok_or_else(|| LocalError::ConfigError {
                reason: format!(
                    "function {} uses runtime custom-container but declares no image",
                    function.name
                ),
            }),
    }
}

/// Entry script baked into runtime images, used as the exec entrypoint for warm containers.
pub fn mock_script(runtime: Runtime) -> String {
    format!("/var/fc/runtime/{runtime}/mock")
}
