//! Procedural macros for the Tessera component system.
//!
//! This crate provides:
//!
//! - `#[export(...)]` - Registers a function as a capability in the link-time
//!   export slice of `tessera-core`
//!
//! # Export Macro
//!
//! A plain function becomes a *callable* capability. The macro also emits a
//! static `<FN>_TYPE` describing the function type, which consumers use to
//! request the export by signature:
//!
//! ```rust,ignore
//! use tessera_macros::export;
//!
//! #[export(name = "parse", priority = 2)]
//! pub fn parse_number(input: String) -> i64 {
//!     input.trim().parse().unwrap_or_default()
//! }
//!
//! let parse = registry.get_one(Some("parse"), Some(&PARSE_NUMBER_TYPE))?;
//! ```
//!
//! With `value`, the function is a constructor run once when the registry is
//! built, and its return value is the capability:
//!
//! ```rust,ignore
//! #[export(name = "greeting", value, contract = GREETER)]
//! fn english() -> English {
//!     English
//! }
//! ```
//!
//! # Properties
//!
//! - `name = "..."` - Contract name (default: the contract type's name, else the function name)
//! - `priority = N` - Priority stored in the `Priority` metadata entry
//! - `contract = PATH` - Static `TypeInfo` declared as the capability type
//! - `service_type = "..."` - Name of the type the value is registered as in a service container
//! - `value` - Export the function's return value instead of the function
//! - `fallible` - With `value`: the constructor returns `Result<T, E>`; failures skip the export

mod export;

use proc_macro::TokenStream;

/// Registers a function as a linked capability export.
///
/// See the [crate documentation](crate) for the supported properties.
#[proc_macro_attribute]
pub fn export(attr: TokenStream, item: TokenStream) -> TokenStream {
    export::export(attr, item)
}
