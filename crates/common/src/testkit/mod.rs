/// Helpers for tests that need real signed events
///
/// This module lets tests mint events and NIP-98 authorization headers
/// with throwaway keys, without talking to any relay.
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::TestSigner;
///
/// let alice = TestSigner::generate();
/// let note = alice.event(1, "hello", &[&["t", "augury"]], 1_700_000_000);
/// note.verify()?;
///
/// let header = alice.auth_header("POST", "http://localhost/api/nip96", now);
/// ```
mod signer;

pub use signer::TestSigner;
