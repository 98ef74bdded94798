use serde::{Serialize, de::DeserializeOwned};

/// Values an actor can store in a backend and hand out to concurrent callers.
///
/// The producer of a value keeps the full value. Every other caller, whether it
/// waited on the same in-flight execution or read the entry back from storage,
/// receives [`Cacheable::shared`], which must only contain what survives
/// serialization.
pub trait Cacheable: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Returns the copy handed to callers that did not produce this value.
    fn shared(&self) -> Self {
        self.clone()
    }
}

impl Cacheable for String {}

impl Cacheable for bytes::Bytes {}
