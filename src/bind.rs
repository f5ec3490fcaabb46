//! Typed access to a command's parameters.
//!
//! A destination type lists its fields, their parameter keys and which of them
//! are required through [`bind_params!`](crate::bind_params). Each field's type
//! decides how the raw payload is coerced through [`FromParam`].

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::parse::Command;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("required parameter {key} not found")]
    Missing { key: &'static str },
    #[error("failed to set field {field}: {cause}")]
    Field { field: &'static str, cause: String },
}

/// Conversion from a parameter payload into a field value.
pub trait FromParam: Sized {
    fn from_param(payload: &str) -> Result<Self, String>;
}

impl FromParam for String {
    fn from_param(payload: &str) -> Result<Self, String> {
        Ok(payload.to_string())
    }
}

impl FromParam for PathBuf {
    fn from_param(payload: &str) -> Result<Self, String> {
        Ok(PathBuf::from(payload))
    }
}

impl FromParam for bool {
    fn from_param(payload: &str) -> Result<Self, String> {
        match payload.trim() {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
            other => Err(format!("invalid boolean: {other:?}")),
        }
    }
}

macro_rules! from_param_via_parse {
    ($($t:ty),*) => {
        $(
            impl FromParam for $t {
                fn from_param(payload: &str) -> Result<Self, String> {
                    payload.trim().parse::<$t>().map_err(|e| format!("{e}: {:?}", payload.trim()))
                }
            }
        )*
    };
}

from_param_via_parse!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl<T: FromParam> FromParam for Option<T> {
    fn from_param(payload: &str) -> Result<Self, String> {
        T::from_param(payload).map(Some)
    }
}

fn from_json<T: DeserializeOwned>(payload: &str) -> Result<T, String> {
    serde_json::from_str(payload).map_err(|e| e.to_string())
}

impl<T: DeserializeOwned> FromParam for Vec<T> {
    fn from_param(payload: &str) -> Result<Self, String> {
        from_json(payload)
    }
}

impl<K: DeserializeOwned + Ord, V: DeserializeOwned> FromParam for BTreeMap<K, V> {
    fn from_param(payload: &str) -> Result<Self, String> {
        from_json(payload)
    }
}

impl<K: DeserializeOwned + Eq + Hash, V: DeserializeOwned> FromParam for HashMap<K, V> {
    fn from_param(payload: &str) -> Result<Self, String> {
        from_json(payload)
    }
}

/// A nested record decoded from a JSON payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Json<T>(pub T);

impl<T: DeserializeOwned> FromParam for Json<T> {
    fn from_param(payload: &str) -> Result<Self, String> {
        from_json(payload).map(Json)
    }
}

impl<T> Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Json<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

/// Looks parameters up on one command and stores them into fields.
pub struct Binder<'a> {
    cmd: &'a Command,
}

impl<'a> Binder<'a> {
    pub fn new(cmd: &'a Command) -> Self {
        Self { cmd }
    }

    /// Bind one field. An absent optional parameter leaves `slot` untouched.
    pub fn field<T: FromParam>(
        &self,
        slot: &mut T,
        key: &'static str,
        field: &'static str,
        required: bool,
    ) -> Result<(), BindError> {
        match self.cmd.param(key) {
            Some(p) => {
                *slot = T::from_param(&p.payload).map_err(|cause| BindError::Field { field, cause })?;
                Ok(())
            }
            None if required => Err(BindError::Missing { key }),
            None => Ok(()),
        }
    }
}

/// A record whose fields can be filled from a command's parameters.
pub trait BindParams {
    fn bind_params(&mut self, cmd: &Command) -> Result<(), BindError>;
}

/// Fill `dest` from the parameters of `cmd`.
pub fn bind<T: BindParams>(cmd: &Command, dest: &mut T) -> Result<(), BindError> {
    dest.bind_params(cmd)
}

/// Build a fresh `T` from its defaults and the parameters of `cmd`.
pub fn bind_new<T: BindParams + Default>(cmd: &Command) -> Result<T, BindError> {
    let mut dest = T::default();
    dest.bind_params(cmd)?;
    Ok(dest)
}

/// Implement [`BindParams`] for a struct.
///
/// ```
/// use cmdblock::bind_params;
///
/// #[derive(Default)]
/// struct Opts {
///     path: String,
///     count: u32,
/// }
///
/// bind_params!(Opts {
///     path: "path" (required),
///     count: "n",
/// });
/// ```
#[macro_export]
macro_rules! bind_params {
    (@required required) => {
        true
    };
    (@required) => {
        false
    };
    ($ty:ty { $($field:ident : $key:literal $(($flag:ident))?),* $(,)? }) => {
        impl $crate::bind::BindParams for $ty {
            fn bind_params(
                &mut self,
                cmd: &$crate::parse::Command,
            ) -> ::std::result::Result<(), $crate::bind::BindError> {
                let binder = $crate::bind::Binder::new(cmd);
                $(
                    binder.field(
                        &mut self.$field,
                        $key,
                        stringify!($field),
                        $crate::bind_params!(@required $($flag)?),
                    )?;
                )*
                Ok(())
            }
        }
    };
}
