//! Selection of the client types a hive run provides.
use hivesim::ClientDefinition;

pub const ROLE_EXECUTION: &str = "eth1";
pub const ROLE_BEACON: &str = "beacon";
pub const ROLE_VALIDATOR: &str = "validator";

/// A beacon node and the validator client of the same implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusPair {
    pub beacon: String,
    pub validator: String,
}

pub fn execution_clients(definitions: &[ClientDefinition]) -> Vec<String> {
    with_role(definitions, ROLE_EXECUTION)
}

/// Pairs every beacon node with the validator client sharing its name stem, e.g. `lighthouse-bn`
/// with `lighthouse-vc`.
pub fn consensus_pairs(definitions: &[ClientDefinition]) -> Vec<ConsensusPair> {
    let validators = with_role(definitions, ROLE_VALIDATOR);
    with_role(definitions, ROLE_BEACON)
        .into_iter()
        .filter_map(|beacon| {
            let stem = beacon.trim_end_matches("-bn");
            validators
                .iter()
                .find(|validator| validator.trim_end_matches("-vc") == stem)
                .map(|validator| ConsensusPair {
                    beacon: beacon.clone(),
                    validator: validator.clone(),
                })
        })
        .collect()
}

fn with_role(definitions: &[ClientDefinition], role: &str) -> Vec<String> {
    definitions
        .iter()
        .filter(|def| def.has_role(role))
        .map(|def| def.name.clone())
        .collect()
}
