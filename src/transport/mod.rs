//! Fingerprinted transport: TLS connector, proxy dialing, HTTP/1.1 and
//! HTTP/2 exchanges, per-session connection pooling.

pub mod connector;
pub mod h1;
pub mod h2;
pub mod pool;
pub mod proxy;
