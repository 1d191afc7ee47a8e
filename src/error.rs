//! Driver error types

/// Caliper driver error with code and message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaliperError {
    /// E01: `initialize` called on a running driver
    AlreadyInitialized,
    /// E02: Operation needs a running driver
    NotInitialized,
    /// E03: No storage left for another instance
    AllocationFailure,
    /// E04: Identity was removed or never issued by this driver
    InvalidHandle,
    /// E05: Driver configuration rejected by `DriverConfig::validate`
    InvalidConfig,
    /// E06: Platform call failed (raw ESP-IDF error code on target)
    Platform(i32),
}

impl CaliperError {
    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyInitialized => "E01",
            Self::NotInitialized => "E02",
            Self::AllocationFailure => "E03",
            Self::InvalidHandle => "E04",
            Self::InvalidConfig => "E05",
            Self::Platform(_) => "E06",
        }
    }

    /// Get error message
    pub fn message(&self) -> &'static str {
        match self {
            Self::AlreadyInitialized => "already initialized",
            Self::NotInitialized => "not initialized",
            Self::AllocationFailure => "instance storage exhausted",
            Self::InvalidHandle => "invalid caliper handle",
            Self::InvalidConfig => "invalid configuration",
            Self::Platform(_) => "platform error",
        }
    }
}

impl core::fmt::Display for CaliperError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Platform(code) => write!(f, "{}: {} ({})", self.code(), self.message(), code),
            _ => write!(f, "{}: {}", self.code(), self.message()),
        }
    }
}

#[cfg(target_os = "espidf")]
impl From<esp_idf_svc::sys::EspError> for CaliperError {
    fn from(e: esp_idf_svc::sys::EspError) -> Self {
        CaliperError::Platform(e.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let text = std::format!("{}", CaliperError::AlreadyInitialized);
        assert_eq!(text, "E01: already initialized");

        let text = std::format!("{}", CaliperError::Platform(259));
        assert_eq!(text, "E06: platform error (259)");
    }

    #[test]
    fn test_error_codes_unique() {
        let all = [
            CaliperError::AlreadyInitialized,
            CaliperError::NotInitialized,
            CaliperError::AllocationFailure,
            CaliperError::InvalidHandle,
            CaliperError::InvalidConfig,
            CaliperError::Platform(0),
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }
}
