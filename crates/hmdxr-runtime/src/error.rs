use openxr::sys;
use thiserror::Error;

/// Failure codes surfaced by the runtime entry points.
///
/// Each variant maps onto exactly one OpenXR result code, see [`XrError::code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XrError {
    #[error("unknown or mismatched handle")]
    HandleInvalid,
    #[error("unknown system id")]
    SystemInvalid,
    #[error("only one instance and one session may exist at a time")]
    LimitReached,
    #[error("graphics requirements were never queried")]
    GraphicsRequirementsCallMissing,
    #[error("no recognized graphics binding in the session create chain")]
    GraphicsDeviceInvalid,
    #[error("validation failure: {0}")]
    ValidationFailure(&'static str),
    #[error("view configuration type unsupported")]
    ViewConfigurationTypeUnsupported,
    #[error("reference space type unsupported")]
    ReferenceSpaceUnsupported,
    #[error("session is already running")]
    SessionRunning,
    #[error("session is not running")]
    SessionNotRunning,
    #[error("session is not ready")]
    SessionNotReady,
    #[error("session is not stopping")]
    SessionNotStopping,
    #[error("API version unsupported")]
    ApiVersionUnsupported,
    #[error("extension not present: {0}")]
    ExtensionNotPresent(String),
    #[error("form factor unsupported")]
    FormFactorUnsupported,
    #[error("function unsupported")]
    FunctionUnsupported,
    #[error("call order invalid")]
    CallOrderInvalid,
    #[error("out of memory")]
    OutOfMemory,
    #[error("runtime failure")]
    RuntimeFailure,
    /// A graphics initializer's own result, carried through unchanged.
    #[error("graphics initialization failed: {0:?}")]
    Graphics(sys::Result),
}

impl XrError {
    pub fn code(&self) -> sys::Result {
        match self {
            Self::HandleInvalid => sys::Result::ERROR_HANDLE_INVALID,
            Self::SystemInvalid => sys::Result::ERROR_SYSTEM_INVALID,
            Self::LimitReached => sys::Result::ERROR_LIMIT_REACHED,
            Self::GraphicsRequirementsCallMissing => {
                sys::Result::ERROR_GRAPHICS_REQUIREMENTS_CALL_MISSING
            }
            Self::GraphicsDeviceInvalid => sys::Result::ERROR_GRAPHICS_DEVICE_INVALID,
            Self::ValidationFailure(_) => sys::Result::ERROR_VALIDATION_FAILURE,
            Self::ViewConfigurationTypeUnsupported => {
                sys::Result::ERROR_VIEW_CONFIGURATION_TYPE_UNSUPPORTED
            }
            Self::ReferenceSpaceUnsupported => sys::Result::ERROR_REFERENCE_SPACE_UNSUPPORTED,
            Self::SessionRunning => sys::Result::ERROR_SESSION_RUNNING,
            Self::SessionNotRunning => sys::Result::ERROR_SESSION_NOT_RUNNING,
            Self::SessionNotReady => sys::Result::ERROR_SESSION_NOT_READY,
            Self::SessionNotStopping => sys::Result::ERROR_SESSION_NOT_STOPPING,
            Self::ApiVersionUnsupported => sys::Result::ERROR_API_VERSION_UNSUPPORTED,
            Self::ExtensionNotPresent(_) => sys::Result::ERROR_EXTENSION_NOT_PRESENT,
            Self::FormFactorUnsupported => sys::Result::ERROR_FORM_FACTOR_UNSUPPORTED,
            Self::FunctionUnsupported => sys::Result::ERROR_FUNCTION_UNSUPPORTED,
            Self::CallOrderInvalid => sys::Result::ERROR_CALL_ORDER_INVALID,
            Self::OutOfMemory => sys::Result::ERROR_OUT_OF_MEMORY,
            Self::RuntimeFailure => sys::Result::ERROR_RUNTIME_FAILURE,
            Self::Graphics(code) => *code,
        }
    }
}

impl From<XrError> for sys::Result {
    fn from(err: XrError) -> Self {
        err.code()
    }
}

impl From<std::collections::TryReserveError> for XrError {
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

pub type XrResult<T> = Result<T, XrError>;

/// Collapse an entry point result into the code handed back across the API boundary.
pub fn result_code<T>(result: &XrResult<T>) -> sys::Result {
    match result {
        Ok(_) => sys::Result::SUCCESS,
        Err(err) => err.code(),
    }
}

/// Failure reported by a native collaborator (graphics device or HMD SDK).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {message}")]
pub struct BackendError {
    pub operation: &'static str,
    pub message: String,
}

impl BackendError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_errors_map_to_session_codes() {
        assert_eq!(
            XrError::SessionNotReady.code(),
            sys::Result::ERROR_SESSION_NOT_READY
        );
        assert_eq!(
            XrError::SessionNotStopping.code(),
            sys::Result::ERROR_SESSION_NOT_STOPPING
        );
        assert_eq!(
            sys::Result::from(XrError::LimitReached),
            sys::Result::ERROR_LIMIT_REACHED
        );
    }

    #[test]
    fn test_graphics_code_passes_through_unchanged() {
        let err = XrError::Graphics(sys::Result::ERROR_GRAPHICS_DEVICE_INVALID);
        assert_eq!(err.code(), sys::Result::ERROR_GRAPHICS_DEVICE_INVALID);

        let err = XrError::Graphics(sys::Result::ERROR_RUNTIME_FAILURE);
        assert_eq!(err.code(), sys::Result::ERROR_RUNTIME_FAILURE);
    }

    #[test]
    fn test_result_code_success() {
        let ok: XrResult<u32> = Ok(7);
        assert_eq!(result_code(&ok), sys::Result::SUCCESS);
        let err: XrResult<u32> = Err(XrError::HandleInvalid);
        assert_eq!(result_code(&err), sys::Result::ERROR_HANDLE_INVALID);
    }

    #[test]
    fn test_backend_error_message() {
        let err = BackendError::new("create texture swapchain", "ovrError_MemoryAllocationFailure");
        assert_eq!(
            err.to_string(),
            "create texture swapchain failed: ovrError_MemoryAllocationFailure"
        );
    }
}
