//! Solidity bindings for the token contract.
//!
//! Besides the ERC-20 surface the token exposes a holder aggregate and a
//! few administrative views; those calls revert on plain ERC-20s.

use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IToken {
        event Transfer(address indexed from, address indexed to, uint256 value);

        function name() external view returns (string memory);
        function symbol() external view returns (string memory);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);

        function owner() external view returns (address);
        function taxFee() external view returns (uint256);
        function paused() external view returns (bool);
        function isBlacklisted(address account) external view returns (bool);
        function holderCount() external view returns (uint256);
        function getAllHolders() external view returns (address[] memory holders, uint256[] memory balances);
    }
}
