#![allow(unused_macros)]

/// Counts a sequence of token trees at compile time.
///
/// ```rust, ignore
///  const N: usize = count_tts!(a b c); // 3
/// ```
macro_rules! count_tts {
    () => { 0usize };
    ($head:tt $($tail:tt)*) => { 1usize + count_tts!($($tail)*) };
}

/// Export a function reference under `weval.func.<index>`.
///
/// The external specializer calls the exported getter to learn the table index of a function
/// it may specialize or reference from a lookup table. The index must be unique within the
/// final binary.
///
/// ```rust
/// fn interpret(code: *const u8, len: u32) -> u32 {
///     len
/// }
///
/// specreq::define_target!(1, interpret);
/// ```
#[macro_export]
macro_rules! define_target {
    ($index:literal, $func:path) => {
        const _: () = {
            #[export_name = concat!("weval.func.", stringify!($index))]
            extern "C" fn target() -> usize {
                $func as usize
            }
        };
    };
}
