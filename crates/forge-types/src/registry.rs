//! The read side of the server registry, as consumed by the proxy.

use crate::descriptor::ServerEntry;
use crate::error::RegistryError;
use std::future::Future;
use std::pin::Pin;

/// A boxed lookup future returned by [`RegistryStore::get`].
pub type EntryFuture<'a> = Pin<Box<dyn Future<Output = Result<ServerEntry, RegistryError>> + Send + 'a>>;

/// Alias -> entry lookup.
///
/// The proxy only reads through this trait; mutation belongs to the concrete
/// store. Dyn-compatible so the proxy can hold an `Arc<dyn RegistryStore>`.
pub trait RegistryStore: Send + Sync {
    /// Resolve an alias. Returns [`RegistryError::NotFound`] when absent.
    fn get<'a>(&'a self, alias: &'a str) -> EntryFuture<'a>;
}
