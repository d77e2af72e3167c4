/// Knobs controlling how method bodies get compiled
#[derive(Debug, Clone)]
pub struct CompilerSettings {
    /// Largest permitted code array, in bytes
    ///
    /// The JVM rejects code attributes of 65536 bytes or more. A smaller ceiling is mostly useful
    /// for exercising the splitting of oversized methods.
    pub max_code_size: usize,

    /// Instructions in the first window tried when looking for a region to move into a helper
    pub split_window: usize,

    /// How far the search window moves along when no region in it can be extracted
    pub split_step: usize,

    /// Regions smaller than this are never extracted
    ///
    /// A call to a helper costs a handful of instructions to pass parameters and unpack the
    /// result, so extracting tiny regions rarely makes the method smaller.
    pub min_helper_instructions: usize,

    /// Rounds of widening individual forward branches before widening all of them
    pub max_layout_retries: usize,

    /// Suffix inserted between the method name and a counter to name helpers
    ///
    /// Helper `n` of method `foo` is called `foo$helpern` with the default prefix.
    pub helper_name_prefix: String,
}

impl CompilerSettings {
    /// Default settings with a different code size ceiling
    pub fn with_max_code_size(max_code_size: usize) -> CompilerSettings {
        CompilerSettings {
            max_code_size,
            ..CompilerSettings::default()
        }
    }
}

impl Default for CompilerSettings {
    fn default() -> CompilerSettings {
        CompilerSettings {
            max_code_size: 65535,
            split_window: 5000,
            split_step: 500,
            min_helper_instructions: 100,
            max_layout_retries: 8,
            helper_name_prefix: String::from("$helper"),
        }
    }
}
