/// A source of named embedded resources.
///
/// [`crate::Assembly`] implements this for real modules; [`MemoryModule`]
/// serves tests and callers that already hold the resource bytes.
pub trait ResourceModule {
    /// Names of every embedded resource, in manifest order.
    fn resource_names(&self) -> Vec<String>;

    /// Returns the bytes of the named resource, or `None` if the name does not resolve.
    fn open_resource(&self, name: &str) -> Option<&[u8]>;
}

/// An in-memory module holding `(name, bytes)` pairs in insertion order.
#[derive(Clone, Debug, Default)]
pub struct MemoryModule {
    resources: Vec<(String, Vec<u8>)>,
}

impl MemoryModule {
    pub fn new() -> Self {
        MemoryModule::default()
    }

    pub fn with_resource(mut self, name: &str, data: Vec<u8>) -> Self {
        self.resources.push((name.to_owned(), data));
        self
    }
}

impl ResourceModule for MemoryModule {
    fn resource_names(&self) -> Vec<String> {
        self.resources.iter().map(|(name, _)| name.clone()).collect()
    }

    fn open_resource(&self, name: &str) -> Option<&[u8]> {
        self.resources
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }
}

impl<M: ResourceModule + ?Sized> ResourceModule for &M {
    fn resource_names(&self) -> Vec<String> {
        (**self).resource_names()
    }

    fn open_resource(&self, name: &str) -> Option<&[u8]> {
        (**self).open_resource(name)
    }
}
