//! TLS ClientHello parameter sets for browser impersonation.
//!
//! Chrome randomizes TLS extension order per connection since v110 (GREASE
//! plus the reorderable extension subset), so the extension list here is the
//! membership set, not a fixed order. BoringSSL reproduces the permutation
//! via `SSL_CTX_set_permute_extensions`.

/// Chrome 133 cipher suites in exact order.
pub const CHROME_133_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
];

/// Chrome 133 signature algorithms.
pub const CHROME_133_SIGNATURE_ALGORITHMS: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "rsa_pss_rsae_sha256",
    "rsa_pkcs1_sha256",
    "ecdsa_secp384r1_sha384",
    "rsa_pss_rsae_sha384",
    "rsa_pkcs1_sha384",
    "rsa_pss_rsae_sha512",
    "rsa_pkcs1_sha512",
];

/// Chrome 133 supported groups.
///
/// Chrome 133 also offers X25519MLKEM768 ahead of x25519; BoringSSL group
/// naming for the hybrid draft is version-dependent, so the profile carries
/// the classical set.
pub const CHROME_133_CURVES: &[&str] = &["x25519", "P-256", "P-384"];

/// Chrome 133 extension membership (IDs), including ALPS (17513) and
/// ECH (65037). Wire order is permuted per connection.
pub const CHROME_133_EXTENSION_IDS: &[u16] = &[
    0, 5, 10, 11, 13, 16, 18, 21, 23, 27, 35, 43, 45, 51, 17513, 65037, 65281,
];

/// ALPN protocol list as sent by Chrome: h2 preferred, then http/1.1.
pub const CHROME_ALPN: &[u8] = b"\x02h2\x08http/1.1";

/// TLS fingerprint configuration applied when building a connector.
#[derive(Debug, Clone)]
pub struct TlsFingerprint {
    /// Cipher suites in order.
    pub cipher_list: Vec<&'static str>,
    /// Signature algorithms.
    pub sigalgs: Vec<&'static str>,
    /// Supported curves/groups.
    pub curves: Vec<&'static str>,
    /// TLS extension membership (reference data for the profile).
    pub extensions: Vec<u16>,
    /// ALPN protocol list in preference order.
    pub alpn: &'static [u8],
    /// Emit GREASE values.
    pub grease: bool,
    /// Randomize extension order per connection.
    pub permute_extensions: bool,
}

impl TlsFingerprint {
    /// The Chrome 133 desktop ClientHello parameter set.
    pub fn chrome_133() -> Self {
        Self {
            cipher_list: CHROME_133_CIPHER_SUITES.to_vec(),
            sigalgs: CHROME_133_SIGNATURE_ALGORITHMS.to_vec(),
            curves: CHROME_133_CURVES.to_vec(),
            extensions: CHROME_133_EXTENSION_IDS.to_vec(),
            alpn: CHROME_ALPN,
            grease: true,
            permute_extensions: true,
        }
    }
}
