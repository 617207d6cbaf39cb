//! Resource type configurations for Azure Resource Manager
//!
//! This module defines:
//! - Resource type definitions (implementing ResourceType trait)
//! - Mapping between attribute names and ARM resource properties

use armature_core::provider::ResourceType;

// =============================================================================
// Resource Type Definitions
// =============================================================================

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
        }
    };
}

define_resource_type!(VirtualNetworkType, "virtual_network");
define_resource_type!(SubnetType, "subnet");

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![Box::new(VirtualNetworkType), Box::new(SubnetType)]
}

// =============================================================================
// Resource Configuration
// =============================================================================

/// Attribute mapping: (attribute name, JSON pointer under "properties",
/// is_required_for_create)
pub type AttrMapping = (&'static str, &'static str, bool);

/// Resource type configuration
pub struct ResourceConfig {
    /// ARM resource type (e.g., "Microsoft.Network/virtualNetworks")
    pub arm_type: &'static str,
    /// URL segment for children of `parent_attr`'s resource (e.g., "subnets")
    pub child_segment: Option<&'static str>,
    /// Attribute naming the parent resource; mutations additionally lock it
    pub parent_attr: Option<&'static str>,
    /// Attribute mappings (attribute name -> ARM properties pointer)
    pub attributes: &'static [AttrMapping],
    /// Whether this is a tracked resource with a top-level location
    pub has_location: bool,
}

pub const VIRTUAL_NETWORK_CONFIG: ResourceConfig = ResourceConfig {
    arm_type: "Microsoft.Network/virtualNetworks",
    child_segment: None,
    parent_attr: None,
    attributes: &[
        ("address_space", "/addressSpace/addressPrefixes", true),
        ("dns_servers", "/dhcpOptions/dnsServers", false),
    ],
    has_location: true,
};

pub const SUBNET_CONFIG: ResourceConfig = ResourceConfig {
    arm_type: "Microsoft.Network/virtualNetworks",
    child_segment: Some("subnets"),
    parent_attr: Some("virtual_network"),
    attributes: &[
        ("address_prefix", "/addressPrefix", true),
        ("service_endpoints", "/serviceEndpoints", false),
    ],
    has_location: false,
};

/// Get the configuration for a resource type
pub fn get_resource_config(resource_type: &str) -> Option<&'static ResourceConfig> {
    match resource_type {
        "virtual_network" => Some(&VIRTUAL_NETWORK_CONFIG),
        "subnet" => Some(&SUBNET_CONFIG),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_resource_types_have_configs() {
        for resource_type in resource_types() {
            assert!(get_resource_config(resource_type.name()).is_some());
        }
    }

    #[test]
    fn subnet_is_a_child_of_virtual_network() {
        let config = get_resource_config("subnet").unwrap();
        assert_eq!(config.child_segment, Some("subnets"));
        assert_eq!(config.parent_attr, Some("virtual_network"));
    }
}
