//! Value codecs.
//!
//! [`Format`] is object-safe so a backend can pick its codec at runtime and hand it
//! out as `&dyn Format`. Generic `serialize`/`deserialize` live on [`FormatExt`],
//! which every format gets for free.
//!
//! Two codecs are provided:
//!
//! - [`JsonFormat`] - the default, readable with any tool that can read the store
//! - [`BincodeFormat`] - compact binary entries

use ::bincode::config::Configuration;
use ::bincode::de::DecoderImpl;
use ::bincode::de::read::SliceReader;
use ::bincode::enc::EncoderImpl;
use ::bincode::serde::Compat;
use ::bincode::{Decode, Encode};
use encore_core::Raw;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use self::bincode::BincodeVecWriter;

mod bincode;
mod json;

pub use bincode::BincodeFormat;
pub use json::JsonFormat;

/// Codec failure.
#[derive(Error, Debug)]
pub enum FormatError {
    /// The value could not be encoded.
    #[error(transparent)]
    Serialize(Box<dyn std::error::Error + Send + Sync>),

    /// The stored bytes could not be decoded.
    #[error(transparent)]
    Deserialize(Box<dyn std::error::Error + Send + Sync>),
}

/// Unique identifier for format types, used to compare format equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatTypeId {
    /// [`JsonFormat`].
    Json,
    /// [`BincodeFormat`].
    Bincode,
    /// User-defined format. The string should be a unique identifier.
    Custom(&'static str),
}

/// Serializer handed to [`Format::with_serializer`] callbacks.
pub enum FormatSerializer<'a> {
    /// Any self-describing serde serializer.
    Serde(&'a mut dyn erased_serde::Serializer),
    /// Bincode encoder.
    Bincode(&'a mut EncoderImpl<BincodeVecWriter, Configuration>),
}

impl FormatSerializer<'_> {
    /// Serializes `value` with whichever serializer is wrapped.
    pub fn serialize<T>(&mut self, value: &T) -> Result<(), FormatError>
    where
        T: Serialize,
    {
        match self {
            FormatSerializer::Serde(ser) => {
                let erased_value = value as &dyn erased_serde::Serialize;
                erased_value
                    .erased_serialize(&mut **ser)
                    .map_err(|e| FormatError::Serialize(Box::new(e)))
            }
            FormatSerializer::Bincode(enc) => Encode::encode(&Compat(value), &mut **enc)
                .map_err(|e| FormatError::Serialize(Box::new(e))),
        }
    }
}

/// Deserializer handed to [`Format::with_deserializer`] callbacks.
pub enum FormatDeserializer<'a, 'de> {
    /// Any self-describing serde deserializer.
    Serde(&'a mut dyn erased_serde::Deserializer<'de>),
    /// Bincode decoder over the stored bytes.
    Bincode(&'a mut DecoderImpl<SliceReader<'de>, Configuration, ()>),
}

impl FormatDeserializer<'_, '_> {
    /// Deserializes a `T` from whichever deserializer is wrapped.
    pub fn deserialize<T>(&mut self) -> Result<T, FormatError>
    where
        T: DeserializeOwned,
    {
        match self {
            FormatDeserializer::Serde(deser) => erased_serde::deserialize(&mut **deser)
                .map_err(|e| FormatError::Deserialize(Box::new(e))),
            FormatDeserializer::Bincode(dec) => {
                let compat: Compat<T> = Decode::decode(&mut **dec)
                    .map_err(|e| FormatError::Deserialize(Box::new(e)))?;
                Ok(compat.0)
            }
        }
    }
}

/// Object-safe codec (type erasure through erased-serde).
pub trait Format: std::fmt::Debug + Send + Sync {
    /// Provides access to a serializer via a callback and returns the encoded bytes.
    fn with_serializer(
        &self,
        f: &mut dyn FnMut(&mut FormatSerializer<'_>) -> Result<(), FormatError>,
    ) -> Result<Raw, FormatError>;

    /// Provides access to a deserializer over `data` via a callback.
    fn with_deserializer(
        &self,
        data: &[u8],
        f: &mut dyn FnMut(&mut FormatDeserializer<'_, '_>) -> Result<(), FormatError>,
    ) -> Result<(), FormatError>;

    /// Clone this format into a box (for object safety).
    fn clone_box(&self) -> Box<dyn Format>;

    /// Returns a unique identifier for this format type.
    fn format_type_id(&self) -> FormatTypeId;
}

/// Generic serialize/deserialize for every [`Format`].
pub trait FormatExt: Format {
    /// Encodes `value`.
    fn serialize<T>(&self, value: &T) -> Result<Raw, FormatError>
    where
        T: Serialize,
    {
        self.with_serializer(&mut |serializer| serializer.serialize(value))
    }

    /// Decodes a `T` from `data`.
    fn deserialize<T>(&self, data: &Raw) -> Result<T, FormatError>
    where
        T: DeserializeOwned,
    {
        let mut result: Option<T> = None;
        self.with_deserializer(data, &mut |deserializer| {
            result = Some(deserializer.deserialize()?);
            Ok(())
        })?;

        result.ok_or_else(|| {
            FormatError::Deserialize(Box::new(std::io::Error::other(
                "deserialization produced no result",
            )))
        })
    }
}

impl<T: Format + ?Sized> FormatExt for T {}

impl Clone for Box<dyn Format> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl Format for Box<dyn Format> {
    fn with_serializer(
        &self,
        f: &mut dyn FnMut(&mut FormatSerializer<'_>) -> Result<(), FormatError>,
    ) -> Result<Raw, FormatError> {
        (**self).with_serializer(f)
    }

    fn with_deserializer(
        &self,
        data: &[u8],
        f: &mut dyn FnMut(&mut FormatDeserializer<'_, '_>) -> Result<(), FormatError>,
    ) -> Result<(), FormatError> {
        (**self).with_deserializer(data, f)
    }

    fn clone_box(&self) -> Box<dyn Format> {
        (**self).clone_box()
    }

    fn format_type_id(&self) -> FormatTypeId {
        (**self).format_type_id()
    }
}

impl Format for std::sync::Arc<dyn Format> {
    fn with_serializer(
        &self,
        f: &mut dyn FnMut(&mut FormatSerializer<'_>) -> Result<(), FormatError>,
    ) -> Result<Raw, FormatError> {
        (**self).with_serializer(f)
    }

    fn with_deserializer(
        &self,
        data: &[u8],
        f: &mut dyn FnMut(&mut FormatDeserializer<'_, '_>) -> Result<(), FormatError>,
    ) -> Result<(), FormatError> {
        (**self).with_deserializer(data, f)
    }

    fn clone_box(&self) -> Box<dyn Format> {
        (**self).clone_box()
    }

    fn format_type_id(&self) -> FormatTypeId {
        (**self).format_type_id()
    }
}
