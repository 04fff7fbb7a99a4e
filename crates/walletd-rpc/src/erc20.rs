use alloy::primitives::{Address, B256, U256, b256};

/// `keccak("Transfer(address,address,uint256)")`.
pub const TRANSFER_EVENT_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

/// `transfer(address,uint256)`.
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// `balanceOf(address)`.
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

const WORD_LEN: usize = 32;

/// ABI-encodes `transfer(to, amount)`: selector, then the address and the
/// amount each left-padded to one 32-byte word.
pub fn transfer_calldata(to: Address, amount: U256) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 2 * WORD_LEN);
    data.extend_from_slice(&TRANSFER_SELECTOR);
    data.extend_from_slice(&left_pad_address(to));
    data.extend_from_slice(&amount.to_be_bytes::<WORD_LEN>());
    data
}

/// ABI-encodes `balanceOf(account)`.
pub fn balance_of_calldata(account: Address) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + WORD_LEN);
    data.extend_from_slice(&BALANCE_OF_SELECTOR);
    data.extend_from_slice(&left_pad_address(account));
    data
}

fn left_pad_address(address: Address) -> [u8; WORD_LEN] {
    let mut word = [0u8; WORD_LEN];
    word[12..].copy_from_slice(address.as_slice());
    word
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, keccak256};

    #[test]
    fn transfer_topic_matches_signature_hash() {
        assert_eq!(
            TRANSFER_EVENT_TOPIC,
            keccak256(b"Transfer(address,address,uint256)")
        );
    }

    #[test]
    fn transfer_calldata_layout() {
        let to = address!("1111111111111111111111111111111111111111");
        let data = transfer_calldata(to, U256::from(1_000_000u64));

        assert_eq!(data.len(), 68);
        assert_eq!(&data[..4], &TRANSFER_SELECTOR);
        // Address word: 12 zero bytes then the address.
        assert_eq!(&data[4..16], &[0u8; 12]);
        assert_eq!(&data[16..36], to.as_slice());
        // Amount word: big-endian 1_000_000.
        assert_eq!(&data[36..65], &[0u8; 29]);
        assert_eq!(&data[65..68], &[0x0f, 0x42, 0x40]);
    }

    #[test]
    fn balance_of_calldata_layout() {
        let account = address!("2222222222222222222222222222222222222222");
        let data = balance_of_calldata(account);

        assert_eq!(data.len(), 36);
        assert_eq!(&data[..4], &BALANCE_OF_SELECTOR);
        assert_eq!(&data[16..36], account.as_slice());
    }
}
