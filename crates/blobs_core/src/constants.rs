pub const APP_NAME: &str = "BlobsFlasher";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DISCLAIMER: &str = "\
================================================================================
WARNING - READ CAREFULLY

This tool rewrites low-level firmware partitions (bootloader, modem, TrustZone
and others). Only continue if you know what you are doing and know how to
recover the device if something goes wrong. You alone are responsible for the
outcome; nobody is obliged to help you unbrick the device.
================================================================================

NOTICE: in testing, the device wiped /data/app and all application data after
flashing and returned to the out-of-box setup screen. Userdata and root modules
were kept, but this is not guaranteed. Back up everything before continuing.
";

pub const CONFIRM_PROMPT: &str = "Do you want to continue? (yes/[no]): ";

/// Device profile of the OnePlus Nord N200 (DE2117).
pub const DEFAULT_MODEL_TOKEN: &str = "OnePlusN200";
pub const DEFAULT_PROPERTY_KEY: &str = "ro.product.name";
pub const DEFAULT_FINGERPRINT_KEY: &str = "system-fingerprint";

pub const DEFAULT_BASE_URL: &str = "https://github.com/elginsk8r/oplus_archive/releases/download/DE2117_11_C.37/";

/// Partitions written by a run, in flashing order.
pub const DEFAULT_PARTITIONS: &[&str] = &[
    "abl",
    "bluetooth",
    "core_nhlos",
    "devcfg",
    "dsp",
    "featenabler",
    "hyp",
    "imagefv",
    "keymaster",
    "logo",
    "modem",
    "oplusstanvbk",
    "qupfw",
    "rpm",
    "tz",
    "uefisecapp",
    "xbl_config",
    "xbl",
];

pub const COMPRESSED_SUFFIX: &str = ".zst";
pub const WORK_DIR_PREFIX: &str = "oplus_download_";
pub const PLATFORM_TOOLS_DIR: &str = "platform-tools";
