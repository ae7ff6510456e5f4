//! Operation descriptors and descriptor tables.
//!
//! # Design
//! Every remote operation is the same call with different metadata: a verb,
//! a path template and a pair of request/response types. Statically typed
//! callers implement [`Operation`] (usually through the [`operation!`]
//! macro); dynamic callers such as the FFI layer look descriptors up by id
//! in an [`OperationTable`] loaded from a JSON route list.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::HttpMethod;
use crate::path::{PathTemplate, TemplateError};

/// What a successful call does to the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionEffect {
    #[default]
    None,
    /// The response carries a credential to store.
    Login,
    /// The credential is dropped once the call completes.
    Logout,
    /// The response carries a credential acting on behalf of another user.
    /// The call itself is sent with the API user's credential.
    Sudo,
}

/// Static metadata for one remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub id: Cow<'static, str>,
    pub method: HttpMethod,
    pub path: Cow<'static, str>,
    #[serde(default)]
    pub session: SessionEffect,
}

impl OperationDescriptor {
    pub const fn new(id: &'static str, method: HttpMethod, path: &'static str) -> Self {
        Self::with_session(id, method, path, SessionEffect::None)
    }

    pub const fn with_session(
        id: &'static str,
        method: HttpMethod,
        path: &'static str,
        session: SessionEffect,
    ) -> Self {
        Self {
            id: Cow::Borrowed(id),
            method,
            path: Cow::Borrowed(path),
            session,
        }
    }

    pub fn template(&self) -> Result<PathTemplate, TemplateError> {
        PathTemplate::parse(&self.path)
    }
}

/// A typed remote operation.
pub trait Operation {
    type Request: Serialize;
    type Response: DeserializeOwned + Default;

    const DESCRIPTOR: OperationDescriptor;
}

/// Declare a unit struct implementing [`Operation`].
///
/// ```
/// use bridge_core::operation;
/// use bridge_core::types::{User, UserRequest};
///
/// operation!(
///     /// Fetch one user.
///     FetchUser, "user", GET "/users/{user_id}", UserRequest => User
/// );
/// ```
#[macro_export]
macro_rules! operation {
    (@method GET) => { $crate::http::HttpMethod::Get };
    (@method POST) => { $crate::http::HttpMethod::Post };
    (@method PUT) => { $crate::http::HttpMethod::Put };
    (@method PATCH) => { $crate::http::HttpMethod::Patch };
    (@method DELETE) => { $crate::http::HttpMethod::Delete };
    ($(#[$meta:meta])* $name:ident, $id:literal, $method:ident $path:literal, $req:ty => $resp:ty) => {
        $crate::operation!($(#[$meta])* $name, $id, $method $path, $req => $resp, None);
    };
    ($(#[$meta:meta])* $name:ident, $id:literal, $method:ident $path:literal, $req:ty => $resp:ty, $effect:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl $crate::descriptor::Operation for $name {
            type Request = $req;
            type Response = $resp;

            const DESCRIPTOR: $crate::descriptor::OperationDescriptor =
                $crate::descriptor::OperationDescriptor::with_session(
                    $id,
                    $crate::operation!(@method $method),
                    $path,
                    $crate::descriptor::SessionEffect::$effect,
                );
        }
    };
}

/// Problems found while loading a route list.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("route list is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate operation id `{0}`")]
    Duplicate(String),
    #[error("operation `{id}` has a malformed path template: {source}")]
    Template {
        id: String,
        #[source]
        source: TemplateError,
    },
}

/// Descriptors indexed by operation id. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct OperationTable {
    operations: BTreeMap<String, OperationDescriptor>,
}

impl OperationTable {
    /// The route list shipped with the crate.
    pub fn builtin() -> Result<Self, TableError> {
        Self::from_json(include_str!("../routes.json"))
    }

    /// Load a JSON array of `{"id", "method", "path", "session"?}` entries.
    pub fn from_json(routes: &str) -> Result<Self, TableError> {
        let descriptors: Vec<OperationDescriptor> = serde_json::from_str(routes)?;
        Self::from_descriptors(descriptors)
    }

    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = OperationDescriptor>,
    ) -> Result<Self, TableError> {
        let mut operations = BTreeMap::new();
        for descriptor in descriptors {
            descriptor.template().map_err(|source| TableError::Template {
                id: descriptor.id.to_string(),
                source,
            })?;
            let id = descriptor.id.to_string();
            if operations.insert(id.clone(), descriptor).is_some() {
                return Err(TableError::Duplicate(id));
            }
        }
        Ok(Self { operations })
    }

    pub fn get(&self, id: &str) -> Option<&OperationDescriptor> {
        self.operations.get(id)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.operations.values()
    }
}
