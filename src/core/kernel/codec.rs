use crate::core::errors::ExchangeError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::marker::PhantomData;

/// Codec trait for turning stream payloads into typed events
///
/// Implementations see the bare payload: combined-stream wrappers are
/// removed by [`StreamDecoder`] before `decode` is called.
pub trait StreamCodec: Send + Sync + 'static {
    /// The type produced for each inbound payload
    type Event: Send + 'static;

    /// Decode one payload
    ///
    /// # Arguments
    /// * `payload` - Raw JSON bytes of a single event
    ///
    /// # Returns
    /// The decoded event, or `ExchangeError::DeserializationError`
    fn decode(&self, payload: &[u8]) -> Result<Self::Event, ExchangeError>;
}

/// Codec for streams that carry a single event type
pub struct TypedCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedCodec<T> {
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TypedCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TypedCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypedCodec<{}>", std::any::type_name::<T>())
    }
}

impl<T> StreamCodec for TypedCodec<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Event = T;

    fn decode(&self, payload: &[u8]) -> Result<T, ExchangeError> {
        decode_payload(payload)
    }
}

/// Decode a payload into `T`, mapping failures to `DeserializationError`
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ExchangeError> {
    serde_json::from_slice(payload).map_err(|e| {
        ExchangeError::DeserializationError(format!(
            "Failed to decode {}: {}",
            short_type_name::<T>(),
            e
        ))
    })
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// How frames on a stream connection are framed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// `/ws/<stream>`: every frame is the bare payload
    #[default]
    Raw,
    /// `/stream?streams=...`: every frame is `{"stream": ..., "data": ...}`
    Combined,
}

/// A decoded event and, on combined connections, the stream it came from
#[derive(Debug, Clone, PartialEq)]
pub struct StreamItem<E> {
    pub stream: Option<String>,
    pub data: E,
}

#[derive(Deserialize)]
struct CombinedFrame {
    stream: String,
    data: Box<RawValue>,
}

/// Unwraps combined frames and hands payloads to a codec
#[derive(Debug, Clone)]
pub struct StreamDecoder<C> {
    mode: StreamMode,
    codec: C,
}

impl<C: StreamCodec> StreamDecoder<C> {
    pub const fn new(mode: StreamMode, codec: C) -> Self {
        Self { mode, codec }
    }

    pub const fn mode(&self) -> StreamMode {
        self.mode
    }

    pub const fn codec(&self) -> &C {
        &self.codec
    }

    /// Decode one inbound frame
    ///
    /// In combined mode the payload under `data` is decoded exactly as a raw
    /// frame with the same bytes would be.
    pub fn decode_frame(&self, frame: &[u8]) -> Result<StreamItem<C::Event>, ExchangeError> {
        match self.mode {
            StreamMode::Raw => Ok(StreamItem {
                stream: None,
                data: self.codec.decode(frame)?,
            }),
            StreamMode::Combined => {
                let combined: CombinedFrame = serde_json::from_slice(frame).map_err(|e| {
                    ExchangeError::DeserializationError(format!(
                        "Invalid combined stream frame: {}",
                        e
                    ))
                })?;
                let data = self.codec.decode(combined.data.get().as_bytes())?;
                Ok(StreamItem {
                    stream: Some(combined.stream),
                    data,
                })
            }
        }
    }
}

/// Discriminant shared by push events: `e` is the event type, `E` the event time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E", default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<u64>,
}

impl EventHeader {
    /// Read only the discriminant of a payload
    pub fn peek(payload: &[u8]) -> Result<Self, ExchangeError> {
        serde_json::from_slice(payload).map_err(|e| {
            ExchangeError::DeserializationError(format!("Missing event type: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Ping {
        #[serde(rename = "e")]
        event_type: String,
        #[serde(rename = "v")]
        value: u32,
    }

    #[test]
    fn test_raw_mode_decodes_whole_frame() {
        let decoder = StreamDecoder::new(StreamMode::Raw, TypedCodec::<Ping>::new());
        let item = decoder.decode_frame(br#"{"e":"ping","v":7}"#).unwrap();
        assert_eq!(item.stream, None);
        assert_eq!(item.data.value, 7);
    }

    #[test]
    fn test_combined_mode_matches_raw_decode() {
        let payload = r#"{"e":"ping","v":42}"#;
        let frame = format!(r#"{{"stream":"btcusdt@ping","data":{}}}"#, payload);

        let raw = StreamDecoder::new(StreamMode::Raw, TypedCodec::<Ping>::new())
            .decode_frame(payload.as_bytes())
            .unwrap();
        let combined = StreamDecoder::new(StreamMode::Combined, TypedCodec::<Ping>::new())
            .decode_frame(frame.as_bytes())
            .unwrap();

        assert_eq!(combined.stream.as_deref(), Some("btcusdt@ping"));
        assert_eq!(combined.data, raw.data);
    }

    #[test]
    fn test_combined_mode_rejects_bare_payload() {
        let decoder = StreamDecoder::new(StreamMode::Combined, TypedCodec::<Ping>::new());
        let err = decoder.decode_frame(br#"{"e":"ping","v":1}"#).unwrap_err();
        assert!(matches!(err, ExchangeError::DeserializationError(_)));
    }

    #[test]
    fn test_decode_error_names_target_type() {
        let err = TypedCodec::<Ping>::new().decode(b"not json").unwrap_err();
        assert!(err.to_string().contains("Ping"));
    }

    #[test]
    fn test_event_header_peek() {
        let header = EventHeader::peek(br#"{"e":"balanceUpdate","E":1573200697110,"a":"BTC"}"#)
            .unwrap();
        assert_eq!(header.event_type, "balanceUpdate");
        assert_eq!(header.event_time, Some(1_573_200_697_110));

        assert!(EventHeader::peek(br#"{"result":null,"id":1}"#).is_err());
    }
}
