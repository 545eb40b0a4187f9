// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn messages_include_node_id() {
    let id = NodeId::new("n1");
    assert_eq!(
        RegistryError::NodeAlreadyRegistered(id.clone()).to_string(),
        "node 'n1' is already registered"
    );
    assert_eq!(RegistryError::NodeNotFound(id).to_string(), "node 'n1' is not registered");
}
