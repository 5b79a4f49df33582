pub mod abi;
pub mod campaign;
pub mod factory;
pub mod rpc;
pub mod wallet;

pub use campaign::{Campaign, CampaignBase, CampaignMetadata, ContractDescriptor, Variant, VestingTerms};
pub use factory::{detect_variant, CampaignFactory, FactoryError};
pub use rpc::{ChainClient, HttpTransport, Receipt, RpcFailure, Transport, TxRequest};
pub use wallet::{RpcSigner, Signer};
