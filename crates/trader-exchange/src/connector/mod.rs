//! 거래소 커넥터.

pub mod kraken;

pub use kraken::{
    decode_response, encode_request, form_body, map_error, sign_payload, KrakenCredentials,
    KrakenHttpTransport, KrakenSigner, NonceGenerator,
};
