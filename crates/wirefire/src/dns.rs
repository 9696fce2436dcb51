//! dns configuration synthesis for map responses.

use wirefire_proto::DnsConfig;
use wirefire_types::{Tailnet, sanitize_tailnet_name};

/// adapt the global dns settings for the given tailnet.
///
/// when magic dns is on, the tailnet domain routes to an empty resolver
/// list (handled by the client's built-in resolver) and joins the search
/// domains. resolution under the magic dns suffix never goes through an
/// exit node.
pub fn adapt(magic_dns: bool, suffix: &str, tailnet: &Tailnet) -> DnsConfig {
    let mut config = DnsConfig::default();

    let tailnet_domain = format!("{}.{}", sanitize_tailnet_name(&tailnet.name), suffix);

    if magic_dns {
        config.routes.insert(tailnet_domain.clone(), Vec::new());
        config.domains.push(tailnet_domain);
        config.proxied = true;
    }

    config.exit_node_filtered_set = vec![format!(".{}", suffix)];

    config
}
