//! Declarative macros to reduce boilerplate across the perfscope codebase

/// Define a named enum with automatic `name()` and `all()` implementations
///
/// # Example
/// ```
/// use perfscope::metric_enum;
///
/// metric_enum! {
///     pub enum Aggregate {
///         Replay => "replayMainThreads",
///         Background => "backgroundThreads",
///     }
/// }
///
/// assert_eq!(Aggregate::Replay.name(), "replayMainThreads");
/// assert_eq!(Aggregate::all().len(), 2);
/// ```
///
/// Expands to:
/// - An enum with Debug, Clone, Copy, PartialEq, Eq, Hash derives
/// - A `name(&self) -> &'static str` method
/// - An `all() -> Vec<Self>` method
#[macro_export]
macro_rules! metric_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $str:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant,)*
        }

        impl $name {
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $str,)*
                }
            }

            pub fn all() -> Vec<$name> {
                vec![$($name::$variant,)*]
            }
        }
    };
}

/// Define an enum with name() and all() methods, plus custom data per variant
///
/// A `from_name()` lookup is generated as well, so configuration strings can
/// be mapped back onto variants.
///
/// # Example
/// ```
/// use perfscope::enum_with_data;
///
/// enum_with_data! {
///     pub enum Node: u16 {
///         Dvm => ("DVM", 0x1),
///         Hnf => ("HNF", 0x5),
///     }
///     impl code -> u16
/// }
///
/// assert_eq!(Node::Hnf.code(), 0x5);
/// assert_eq!(Node::from_name("DVM"), Some(Node::Dvm));
/// ```
#[macro_export]
macro_rules! enum_with_data {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident: $data_type:ty {
            $($variant:ident => ($str:literal, $data:expr)),* $(,)?
        }
        impl $method:ident -> $return_type:ty
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant,)*
        }

        impl $name {
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $str,)*
                }
            }

            pub fn $method(&self) -> $return_type {
                match self {
                    $($name::$variant => $data,)*
                }
            }

            pub fn from_name(name: &str) -> Option<$name> {
                match name {
                    $($str => Some($name::$variant),)*
                    _ => None,
                }
            }

            pub fn all() -> Vec<$name> {
                vec![$($name::$variant,)*]
            }
        }
    };
}
