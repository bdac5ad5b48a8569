//! Fixed names and layout conventions shared across the crate.

/// Default configuration file name, looked up in the current directory.
pub const CONFIG_FILENAME: &str = "fwstitch.toml";

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "FWSTITCH_CONFIG";

pub const OBJCOPY_ENV: &str = "FWSTITCH_OBJCOPY";
pub const XXD_ENV: &str = "FWSTITCH_XXD";
pub const BUILD_TOOL_ENV: &str = "FWSTITCH_BUILD_TOOL";

/// Subdirectory of the host build directory holding generated sources
/// and the bridged child binary.
pub const GEN_DIR: &str = "xxd_gen";

/// File name of the child binary once bridged into the host tree.
pub const CHILD_BIN_NAME: &str = "firmware.bin";

/// Flag that stops the outer build tool from cleaning other environments.
pub const DISABLE_AUTO_CLEAN_FLAG: &str = "--disable-auto-clean";

/// Largest blob the 16-bit length declaration can describe.
pub const MAX_BLOB_LEN: usize = u16::MAX as usize;
