use ethers::prelude::abigen;

abigen!(
    ITokenExchange,
    r#"[
        function getAllowedTokens() external view returns (address[])
        function getClaimableTokens(address user) external view returns (address[])
        function claimable(address user, address token) external view returns (uint256)
    ]"#
);
