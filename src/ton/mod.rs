//! TON Blockchain Adapter
//!
//! The settlement core's only contract with the chain: read the platform
//! wallet's sequence number, submit a transfer, poll for confirmation, and
//! list recent transactions. Message signing lives in an external signer
//! daemon; this module never touches key material.

pub mod address;
pub mod client;

pub use address::{normalize, same_account, AddressError, TonAddress};
pub use client::{
    IncomingTransfer, OutgoingTransfer, TonError, TonTransfer, TonapiClient,
};
