// src/constants.rs

/// The in-band marker a command writes into its result to signal failure.
pub const SHIRE_ERROR: &str = "<SHIRE_ERROR>";

/// The marker a command resolves to when it was cancelled before finishing.
pub const SHIRE_CANCELLED: &str = "<SHIRE_CANCELLED>";

/// Prefix of a comment that chains another document as the next job.
pub const FLOW_FLAG: &str = "[flow]:";

/// Delimiters wrapped around markdown section headings in the rendered output.
pub const HEADING_OPEN: &str = "#[[";
/// See [`HEADING_OPEN`].
pub const HEADING_CLOSE: &str = "]]#";

/// Marker line that opens and closes the front-matter header.
pub const FRONT_MATTER_MARKER: &str = "---";

/// A context value whose string form starts with this character removes the key.
pub const UNSET_SENTINEL: char = '$';

/// The fixed token `redact` substitutes for sensitive values.
pub const REDACT_MASK: &str = "****";

/// The name of the directory containing shire configuration for a project.
pub const SHIRE_DIR: &str = ".shire";

/// The name of the project settings file (inside .shire/).
pub const SETTINGS_FILENAME: &str = "shire.toml";

/// Default directory (relative to the project root) holding custom command documents.
pub const DEFAULT_COMMANDS_DIR: &str = ".shire/commands";

/// File extension of shire documents.
pub const DOCUMENT_EXTENSION: &str = "shire";

/// Maximum nesting of sub-documents (conditional blocks, custom commands).
pub const MAX_RECURSION_DEPTH: u32 = 32;
