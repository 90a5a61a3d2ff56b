pub const APP_NAME: &str = "luz";

/// Project declaration file, looked up in the project root.
pub const PROJECT_FILE: &str = "luz.toml";

/// Per-project scratch directory holding objects, linked outputs and the staging tree.
pub const SCRATCH_DIR: &str = ".luz";

pub const HASHLIST_FILENAME: &str = "hashlist.json";

/// Name of the staging root inside the scratch directory.
pub const STAGING_DIR: &str = "_";

/// Alternate root used when the root-prefix (rootless) policy is active.
pub const ROOTLESS_PREFIX: &str = "var/jb";

pub const OBJ_DIR: &str = "obj";
pub const DYLIB_DIR: &str = "dylib";
pub const BIN_DIR: &str = "bin";
pub const PROCESSED_DIR: &str = "logos-processed";
pub const PACKAGES_DIR: &str = "packages";
pub const LAYOUT_DIR: &str = "layout";

/// Read size used when hashing source files.
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Source extensions routed through the macro preprocessor, with the extension of the expanded file.
pub const PREPROCESSED_EXTENSIONS: &[(&str, &str)] = &[("x", "m"), ("xm", "mm")];

pub const SWIFT_EXTENSION: &str = "swift";

pub const MAINTAINER_SCRIPTS: &[&str] = &["preinst", "postinst", "prerm", "postrm"];

pub const HEADERS_REPO: &str = "https://github.com/theos/headers";
pub const LIBRARIES_REPO: &str = "https://github.com/elihwyma/lib";
pub const LIBRARIES_BRANCH: &str = "rootless";
pub const PREPROCESSOR_REPO: &str = "https://github.com/LuzProject/logos";
