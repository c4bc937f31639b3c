//! Strike call payload and its ABI encoding.
//!
//! Every strike has the same shape: a payable `executeTriangle` on the
//! configured executor contract, routing the native amount from `token_in`
//! to `token_out` through one router.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use std::fmt;

use crate::types::{format_ether, Wei};

sol! {
    function executeTriangle(address router, address tokenA, address tokenB, uint256 amountIn) external payable;
}

/// Fully parameterised strike, ready to simulate or sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrikeCall {
    pub executor: Address,
    pub router: Address,
    pub token_in: Address,
    pub token_out: Address,
    /// `amountIn`, also sent as `msg.value`.
    pub amount: Wei,
    pub gas_limit: u64,
    pub max_fee_per_gas: Wei,
    pub max_priority_fee_per_gas: Wei,
}

impl StrikeCall {
    /// ABI-encoded calldata.
    pub fn calldata(&self) -> Bytes {
        executeTriangleCall {
            router: self.router,
            tokenA: self.token_in,
            tokenB: self.token_out,
            amountIn: U256::from(self.amount),
        }
        .abi_encode()
        .into()
    }

    pub fn value(&self) -> U256 {
        U256::from(self.amount)
    }
}

impl fmt::Display for StrikeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "executeTriangle({} -> {} via {}, {} ETH)",
            self.token_in,
            self.token_out,
            self.router,
            format_ether(self.amount)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StrikeCall {
        StrikeCall {
            executor: Address::repeat_byte(0x11),
            router: Address::repeat_byte(0x22),
            token_in: Address::repeat_byte(0x33),
            token_out: Address::repeat_byte(0x44),
            amount: 1_000,
            gas_limit: 600_000,
            max_fee_per_gas: 2,
            max_priority_fee_per_gas: 1,
        }
    }

    #[test]
    fn test_calldata_layout() {
        let data = sample().calldata();
        assert_eq!(data.len(), 4 + 4 * 32);
        assert_eq!(&data[..4], executeTriangleCall::SELECTOR.as_slice());
        // amountIn is the last word, big-endian
        assert_eq!(data[data.len() - 2..], [0x03, 0xe8]);
        // router sits right-aligned in the first argument word
        assert_eq!(&data[4 + 12..4 + 32], Address::repeat_byte(0x22).as_slice());
    }

    #[test]
    fn test_value_matches_amount() {
        assert_eq!(sample().value(), U256::from(1_000u64));
    }
}
