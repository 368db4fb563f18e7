//! Parameter store bridge.
//!
//! Persists the startup arguments and description of a service so that
//! the arguments given at registration time are replayed on every start.
//!
//! Layout, relative to the store root:
//!
//! ```text
//! <service>               Description = "free text"
//! <service>\Parameters    Param1 = "-c"
//!                         Param2 = "/etc/example.conf"
//! ```

use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::store::{KeyValueStore, SEPARATOR, StoreValue, namespace};
use crate::types::ServiceIdentity;

/// Sub-namespace holding the startup arguments.
pub const PARAMETERS_KEY: &str = "Parameters";

/// Value name of the description.
pub const DESCRIPTION_VALUE: &str = "Description";

/// Prefix of argument value names (`Param1`, `Param2`, ...).
pub const PARAM_PREFIX: &str = "Param";

/// Value name of the `index`-th argument (1-based).
#[must_use]
pub fn param_name(index: usize) -> String {
    format!("{PARAM_PREFIX}{index}")
}

/// A stored argument that could not be read.
#[derive(Debug)]
pub struct ParameterReadFailure {
    /// Value name that failed (`ParamN`).
    pub key: String,
    /// Why it failed.
    pub error: StoreError,
}

/// Result of reading the stored arguments.
#[derive(Debug, Default)]
pub struct ParameterLoad {
    /// Arguments read, in order. On failure, the prefix read before it.
    pub values: Vec<String>,
    /// The read that ended the sequence early, if any.
    pub failure: Option<ParameterReadFailure>,
}

/// Reads and writes service parameters in a [`KeyValueStore`].
#[derive(Clone)]
pub struct ParameterStore {
    store: Arc<dyn KeyValueStore>,
}

impl ParameterStore {
    /// Creates a bridge over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Namespace of the service's arguments.
    #[must_use]
    pub fn parameters_namespace(identity: &ServiceIdentity) -> String {
        namespace(&[&identity.name, PARAMETERS_KEY])
    }

    /// Replaces the stored arguments with `args`.
    ///
    /// An empty `args` clears the stored arguments.
    pub fn save_parameters(&self, identity: &ServiceIdentity, args: &[String]) -> StoreResult<()> {
        let ns = Self::parameters_namespace(identity);
        self.store.remove_namespace(&ns)?;
        for (i, arg) in args.iter().enumerate() {
            self.store
                .write(&ns, &param_name(i + 1), &StoreValue::String(arg.clone()))?;
        }
        tracing::debug!(service = %identity.name, count = args.len(), "saved startup parameters");
        Ok(())
    }

    /// Returns the stored arguments, or an empty list if there are none.
    ///
    /// Never fails: an unreadable store counts as "no extra parameters".
    pub fn load_parameters(&self, identity: &ServiceIdentity) -> Vec<String> {
        self.load_parameters_detailed(identity).values
    }

    /// Reads the stored arguments, reporting the read that ended the
    /// sequence early.
    ///
    /// Arguments are read in order `Param1..ParamN` where N is the number of
    /// values in the namespace. The first missing, non-string or unreadable
    /// value ends the sequence; the prefix read so far is kept.
    pub fn load_parameters_detailed(&self, identity: &ServiceIdentity) -> ParameterLoad {
        let ns = Self::parameters_namespace(identity);
        let total = match self.store.value_count(&ns) {
            Ok(Some(total)) => total,
            Ok(None) => return ParameterLoad::default(),
            Err(e) => {
                tracing::warn!(service = %identity.name, error = %e, "parameter store unreadable");
                return ParameterLoad::default();
            }
        };

        let mut load = ParameterLoad {
            values: Vec::with_capacity(total),
            failure: None,
        };
        for index in 1..=total {
            let key = param_name(index);
            let error = match self.store.read(&ns, &key) {
                Ok(Some(value)) => match value.as_str() {
                    Some(text) => {
                        load.values.push(text.to_string());
                        continue;
                    }
                    None => StoreError::WrongType {
                        key: key.clone(),
                        found: value.type_name().to_string(),
                    },
                },
                Ok(None) => StoreError::backend("read", format!("{ns}{SEPARATOR}{key}"), "missing"),
                Err(e) => e,
            };
            tracing::error!(
                service = %identity.name,
                key = %key,
                error = %error,
                kept = load.values.len(),
                "querying startup parameter failed"
            );
            load.failure = Some(ParameterReadFailure { key, error });
            break;
        }
        load
    }

    /// Stores the service description.
    pub fn save_description(&self, identity: &ServiceIdentity, description: &str) -> StoreResult<()> {
        self.store.write(
            &identity.name,
            DESCRIPTION_VALUE,
            &StoreValue::String(description.to_string()),
        )
    }

    /// Returns the stored description, if any.
    pub fn load_description(&self, identity: &ServiceIdentity) -> Option<String> {
        match self.store.read(&identity.name, DESCRIPTION_VALUE) {
            Ok(value) => value.and_then(|v| v.as_str().map(str::to_string)),
            Err(e) => {
                tracing::warn!(service = %identity.name, error = %e, "description unreadable");
                None
            }
        }
    }

    /// Removes the stored arguments and description.
    ///
    /// Only the values this bridge writes are touched; the rest of the
    /// service's namespace belongs to the service manager.
    pub fn clear(&self, identity: &ServiceIdentity) -> StoreResult<bool> {
        let parameters = self
            .store
            .remove_namespace(&Self::parameters_namespace(identity))?;
        let description = self.store.remove_value(&identity.name, DESCRIPTION_VALUE)?;
        Ok(parameters || description)
    }
}

impl std::fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterStore").finish_non_exhaustive()
    }
}
