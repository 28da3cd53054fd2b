//! Types for use when configuring bloomcast modules.

use crate::*;

/// helper transcode function
fn tc<S: serde::Serialize, D: serde::de::DeserializeOwned>(
    s: &S,
) -> BcResult<D> {
    serde_json::from_str(
        &serde_json::to_string(s)
            .map_err(|e| BcError::other_src("encode", e))?,
    )
    .map_err(|e| BcError::other_src("decode", e))
}

/// Denotes a type used to configure a specific bloomcast module.
///
/// Note, the types implementing this trait are specifically for
/// configuration that cannot be changed at runtime, the likes of which
/// might be found in a configuration file.
///
/// A module defines an inner config struct plus a module-level wrapper
/// whose single field is named after the module. The wrapper is what gets
/// merged into [Config], so the module name ends up as the top-level key.
///
/// It is highly recommended that you expose this type in your module docs
/// to help devs using your module understand how to configure it.
pub trait ModConfig:
    'static
    + Sized
    + Default
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
{
}

/// Bloomcast configuration.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Config(serde_json::Map<String, serde_json::Value>);

impl Config {
    /// When bloomcast is generating a default or example configuration
    /// file, it will pass a mutable reference of this config struct to
    /// the module factories that are configured to be used. Those factories
    /// should call this function to add their default configuration
    /// parameters to that file.
    pub fn set_module_config<M: ModConfig>(
        &mut self,
        module_config: &M,
    ) -> BcResult<()> {
        let encoded: serde_json::Value = tc(module_config)?;
        let serde_json::Value::Object(entries) = encoded else {
            return Err(BcError::other(
                "module config must serialize as an object",
            ));
        };
        for (module_name, value) in entries {
            if self.0.contains_key(&module_name) {
                return Err(BcError::other(format!(
                    "Refusing to overwrite conflicting module name: {module_name}"
                )));
            }
            self.0.insert(module_name, value);
        }
        Ok(())
    }

    /// When bloomcast is initializing, each module may choose to call this
    /// function to extract its module config. Note that this config can be
    /// loaded from disk and edited by humans, so the deserialization on the
    /// module config should be tolerant to missing properties, setting sane
    /// defaults. Unknown properties belonging to other modules are ignored.
    pub fn get_module_config<M: ModConfig>(&self) -> BcResult<M> {
        tc(&self.0)
    }
}
