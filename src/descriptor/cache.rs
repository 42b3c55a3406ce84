use std::any::TypeId;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::trace;

use super::TypeDescriptor;

static DESCRIPTORS: Lazy<DashMap<TypeId, &'static TypeDescriptor>> = Lazy::new(DashMap::new);

/// Return the memoized descriptor for `T`, building it on first use.
///
/// Descriptors live for the whole process: the set of described types is
/// fixed by the program, so each is built and leaked exactly once. `build`
/// must not resolve other descriptors (it only stores [`super::TypeRef`]s),
/// which keeps construction free of re-entrancy.
pub fn cached<T: ?Sized + 'static>(build: impl FnOnce() -> TypeDescriptor) -> &'static TypeDescriptor {
    let id = TypeId::of::<T>();
    if let Some(found) = DESCRIPTORS.get(&id) {
        return *found;
    }
    let entry = DESCRIPTORS.entry(id).or_insert_with(|| {
        let desc: &'static TypeDescriptor = Box::leak(Box::new(build()));
        trace!(type_name = desc.name, kind = desc.kind_name(), "Type descriptor built");
        desc
    });
    *entry
}

/// Number of distinct descriptors built so far.
#[must_use]
pub fn cached_count() -> usize {
    DESCRIPTORS.len()
}
