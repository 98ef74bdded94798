use bytes::Bytes;
use encore_core::Raw;

use super::{Format, FormatDeserializer, FormatError, FormatSerializer, FormatTypeId};

/// `Vec<u8>` sink for bincode's encoder; bincode keeps its own one private.
#[derive(Default)]
pub struct BincodeVecWriter(Vec<u8>);

impl BincodeVecWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Returns the written bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl ::bincode::enc::write::Writer for BincodeVecWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ::bincode::error::EncodeError> {
        self.0.extend_from_slice(bytes);
        Ok(())
    }
}

/// Bincode format, standard configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeFormat;

impl Format for BincodeFormat {
    fn with_serializer(
        &self,
        f: &mut dyn FnMut(&mut FormatSerializer<'_>) -> Result<(), FormatError>,
    ) -> Result<Raw, FormatError> {
        let writer = BincodeVecWriter::new();
        let config = ::bincode::config::standard();
        let mut encoder = ::bincode::enc::EncoderImpl::new(writer, config);

        let mut format_ser = FormatSerializer::Bincode(&mut encoder);
        f(&mut format_ser)?;

        let buf = encoder.into_writer().into_vec();
        Ok(Bytes::from(buf))
    }

    fn with_deserializer(
        &self,
        data: &[u8],
        f: &mut dyn FnMut(&mut FormatDeserializer<'_, '_>) -> Result<(), FormatError>,
    ) -> Result<(), FormatError> {
        use ::bincode::de::read::SliceReader;

        let reader = SliceReader::new(data);
        let config = ::bincode::config::standard();
        let mut decoder = ::bincode::de::DecoderImpl::new(reader, config, ());

        let mut format_deser = FormatDeserializer::Bincode(&mut decoder);
        f(&mut format_deser)?;

        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Format> {
        Box::new(*self)
    }

    fn format_type_id(&self) -> FormatTypeId {
        FormatTypeId::Bincode
    }
}
