use crate::error::ApiError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

// Create a type alias for the HMAC-SHA256 implementation.
type HmacSha256 = Hmac<Sha256>;

/// Creates an HMAC-SHA256 signature for a given query string.
///
/// Binance requires all private API calls to be signed with the account secret.
/// The signature is returned hex encoded, as the API expects.
pub fn sign_request(secret: &str, query_string: &str) -> Result<String, ApiError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ApiError::Signing(e.to_string()))?;

    mac.update(query_string.as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_the_documented_binance_example() {
        // Example request from the Binance API documentation.
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";

        assert_eq!(
            sign_request(secret, query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }
}
