// -
// Endpoint property keys

/// Property carrying the unique endpoint identifier
pub const ENDPOINT_ID: &str = "osgi.remote.endpoint.id";

/// Property carrying the endpoint location URI
pub const ENDPOINT_LOCATION: &str = "osgi.remote.endpoint.location";

/// Property carrying the list of published interface names
pub const SERVICE_INTERFACE_NAME: &str = "service.interface";

/// Consumers carrying this property set to `true` belong to discovery itself
pub const DISCOVERY_ZOOKEEPER_ID: &str = "org.apache.cxf.dosgi.discovery.zookeeper";

/// Version reported for every provided interface
pub const DEFAULT_INTERFACE_VERSION: &str = "0.0";

// -
// Coordination tree layout

/// Root of the per-interface subtrees
pub const DEFAULT_ROOT_PATH: &str = "/osgi/service_registry";

pub(crate) const PATH_SEPARATOR: char = '/';
