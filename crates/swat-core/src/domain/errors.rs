use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SwatResult<T> = Result<T, SwatError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwatErrorCategory {
    Success,
    ConfigurationError,
    FormatError,
    DataError,
    ExecutionError,
    IoSystemError,
    InternalError,
}

impl SwatErrorCategory {
    pub const fn exit_status(self) -> ExitStatusMapping {
        match self {
            Self::Success => ExitStatusMapping {
                exit_code: 0,
                rust_category: "Success",
                class: "SUCCESS",
            },
            Self::ConfigurationError => ExitStatusMapping {
                exit_code: 2,
                rust_category: "ConfigurationError",
                class: "CONFIG_FATAL",
            },
            Self::FormatError => ExitStatusMapping {
                exit_code: 3,
                rust_category: "FormatError",
                class: "FORMAT_FATAL",
            },
            Self::DataError => ExitStatusMapping {
                exit_code: 3,
                rust_category: "DataError",
                class: "DATA_FATAL",
            },
            Self::ExecutionError => ExitStatusMapping {
                exit_code: 4,
                rust_category: "ExecutionError",
                class: "RUN_FATAL",
            },
            Self::IoSystemError => ExitStatusMapping {
                exit_code: 5,
                rust_category: "IoSystemError",
                class: "IO_FATAL",
            },
            Self::InternalError => ExitStatusMapping {
                exit_code: 5,
                rust_category: "InternalError",
                class: "SYS_FATAL",
            },
        }
    }

    pub const fn exit_code(self) -> i32 {
        self.exit_status().exit_code
    }

    pub const fn rust_category(self) -> &'static str {
        self.exit_status().rust_category
    }

    pub const fn class(self) -> &'static str {
        self.exit_status().class
    }

    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatusMapping {
    pub exit_code: i32,
    pub rust_category: &'static str,
    pub class: &'static str,
}

/// Error carried across every public operation of the crate.
///
/// `placeholder` is a stable dotted identifier (`CONFIG.EXECUTABLE`,
/// `DATA.DATE_RANGE`, ...) and `message` names the offending parameter, file,
/// column or value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwatError {
    category: SwatErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl SwatError {
    pub fn new(
        category: SwatErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn configuration(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SwatErrorCategory::ConfigurationError, placeholder, message)
    }

    pub fn format(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SwatErrorCategory::FormatError, placeholder, message)
    }

    pub fn data(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SwatErrorCategory::DataError, placeholder, message)
    }

    pub fn execution(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SwatErrorCategory::ExecutionError, placeholder, message)
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SwatErrorCategory::IoSystemError, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SwatErrorCategory::InternalError, placeholder, message)
    }

    pub const fn category(&self) -> SwatErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        let severity = if self.category.is_fatal() {
            "ERROR"
        } else {
            "INFO"
        };
        format!("{}: [{}] {}", severity, self.placeholder, self.message)
    }

    pub fn fatal_exit_line(&self) -> Option<String> {
        self.category
            .is_fatal()
            .then(|| format!("FATAL EXIT CODE: {}", self.exit_code()))
    }
}

impl Display for SwatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.rust_category(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for SwatError {}

#[cfg(test)]
mod tests {
    use super::{SwatError, SwatErrorCategory};

    #[test]
    fn exit_mapping_is_stable() {
        let cases = [
            (SwatErrorCategory::Success, 0, "Success", "SUCCESS"),
            (
                SwatErrorCategory::ConfigurationError,
                2,
                "ConfigurationError",
                "CONFIG_FATAL",
            ),
            (SwatErrorCategory::FormatError, 3, "FormatError", "FORMAT_FATAL"),
            (SwatErrorCategory::DataError, 3, "DataError", "DATA_FATAL"),
            (
                SwatErrorCategory::ExecutionError,
                4,
                "ExecutionError",
                "RUN_FATAL",
            ),
            (SwatErrorCategory::IoSystemError, 5, "IoSystemError", "IO_FATAL"),
            (SwatErrorCategory::InternalError, 5, "InternalError", "SYS_FATAL"),
        ];

        for (category, exit_code, rust_category, class) in cases {
            let mapping = category.exit_status();
            assert_eq!(mapping.exit_code, exit_code);
            assert_eq!(mapping.rust_category, rust_category);
            assert_eq!(mapping.class, class);
        }
    }

    #[test]
    fn fatal_error_renders_diagnostic_lines() {
        let error = SwatError::configuration(
            "CONFIG.EXECUTABLE",
            "expected exactly one executable file in 'TxtInOut', found 2",
        );

        assert_eq!(error.exit_code(), 2);
        assert_eq!(
            error.diagnostic_line(),
            "ERROR: [CONFIG.EXECUTABLE] expected exactly one executable file in 'TxtInOut', found 2"
        );
        assert_eq!(
            error.fatal_exit_line().as_deref(),
            Some("FATAL EXIT CODE: 2")
        );
    }
}
