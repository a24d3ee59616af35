//! Params keeper: named subspaces of runtime-configurable module
//! parameters, plus the registry of param-set prototypes the boundary
//! marshals against.

use std::collections::BTreeMap;
use std::collections::HashMap;

use super::proto::TokenFactoryParams;

/// Subspace name the tokenfactory params live under.
pub const TOKENFACTORY_SUBSPACE: &str = "tokenfactory";

/// Type url the tokenfactory param set is registered as.
pub const TOKENFACTORY_PARAMS_TYPE_URL: &str = "/osmosis.tokenfactory.v1beta1.Params";

/// A strongly-typed bundle of module parameters that can cross the boundary
/// as protobuf bytes.
pub trait ParamSet: Send {
    /// The protobuf type url identifying this set.
    fn type_url(&self) -> &'static str;
    /// Encode the set to protobuf bytes.
    fn encode_set(&self) -> Vec<u8>;
    /// Merge protobuf bytes into this set.
    fn merge_set(&mut self, bytes: &[u8]) -> Result<(), prost::DecodeError>;
}

impl ParamSet for TokenFactoryParams {
    fn type_url(&self) -> &'static str {
        TOKENFACTORY_PARAMS_TYPE_URL
    }

    fn encode_set(&self) -> Vec<u8> {
        prost::Message::encode_to_vec(self)
    }

    fn merge_set(&mut self, bytes: &[u8]) -> Result<(), prost::DecodeError> {
        *self = prost::Message::decode(bytes)?;
        Ok(())
    }
}

type ParamSetFactory = Box<dyn Fn() -> Box<dyn ParamSet> + Send + Sync>;

/// Mapping from type url to an empty, mutable param-set prototype.
///
/// Populated once at environment setup; lookups afterwards are read-only.
#[derive(Default)]
pub struct ParamTypeRegistry {
    factories: HashMap<String, ParamSetFactory>,
}

impl ParamTypeRegistry {
    /// Register a param-set type by its type url.
    pub fn register<P>(&mut self)
    where
        P: ParamSet + Default + 'static,
    {
        let url = P::default().type_url().to_string();
        self.factories
            .insert(url, Box::new(|| Box::new(P::default())));
    }

    /// A fresh empty prototype for a type url, if registered.
    pub fn empty_set(&self, type_url: &str) -> Option<Box<dyn ParamSet>> {
        self.factories.get(type_url).map(|factory| factory())
    }
}

/// In-memory params state: subspace name -> type url -> encoded set.
#[derive(Default)]
pub struct ParamsKeeper {
    subspaces: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
}

impl ParamsKeeper {
    /// Create a subspace if absent.
    pub fn ensure_subspace(&mut self, name: &str) {
        self.subspaces.entry(name.to_string()).or_default();
    }

    /// Whether a subspace exists.
    pub fn has_subspace(&self, name: &str) -> bool {
        self.subspaces.contains_key(name)
    }

    /// Stored bytes for a type url within a subspace, if any were written.
    pub fn get_raw(&self, subspace: &str, type_url: &str) -> Option<&[u8]> {
        self.subspaces
            .get(subspace)?
            .get(type_url)
            .map(Vec::as_slice)
    }

    /// Store the encoded set under its type url within a subspace. The
    /// subspace must already exist.
    pub fn set_raw(&mut self, subspace: &str, type_url: &str, bytes: Vec<u8>) -> bool {
        match self.subspaces.get_mut(subspace) {
            Some(space) => {
                space.insert(type_url.to_string(), bytes);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::proto::Coin;

    #[test]
    fn registry_yields_fresh_prototypes() {
        let mut registry = ParamTypeRegistry::default();
        registry.register::<TokenFactoryParams>();

        let proto = registry.empty_set(TOKENFACTORY_PARAMS_TYPE_URL).unwrap();
        assert_eq!(proto.type_url(), TOKENFACTORY_PARAMS_TYPE_URL);
        assert!(registry.empty_set("/unknown.Params").is_none());
    }

    #[test]
    fn param_set_round_trip_through_registry() {
        let mut registry = ParamTypeRegistry::default();
        registry.register::<TokenFactoryParams>();

        let original = TokenFactoryParams {
            denom_creation_fee: vec![Coin {
                denom: "untrn".to_string(),
                amount: "1000".to_string(),
            }],
            denom_creation_gas_consume: 2_000_000,
        };

        let mut proto = registry.empty_set(TOKENFACTORY_PARAMS_TYPE_URL).unwrap();
        proto.merge_set(&original.encode_set()).unwrap();
        assert_eq!(proto.encode_set(), original.encode_set());
    }

    #[test]
    fn keeper_stores_per_subspace() {
        let mut keeper = ParamsKeeper::default();
        keeper.ensure_subspace("tokenfactory");

        assert!(keeper.set_raw("tokenfactory", "/x.Params", vec![1, 2]));
        assert!(!keeper.set_raw("missing", "/x.Params", vec![1, 2]));

        assert_eq!(keeper.get_raw("tokenfactory", "/x.Params"), Some(&[1u8, 2][..]));
        assert_eq!(keeper.get_raw("tokenfactory", "/y.Params"), None);
        assert!(!keeper.has_subspace("missing"));
    }
}
