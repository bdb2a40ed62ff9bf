use basalt_primitives::encoding::{decode, encode};
use basalt_primitives::{
    BaseInput, Block, BlockHeader, KeyInput, KeyOutput, MultisignatureInput,
    MultisignatureOutput, Transaction, TransactionInput, TransactionOutput,
    TransactionOutputTarget,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_hash(rng: &mut StdRng) -> [u8; 32] {
    let mut hash = [0u8; 32];
    rng.fill(&mut hash);
    hash
}

fn random_signature(rng: &mut StdRng) -> [u8; 64] {
    let mut sig = [0u8; 64];
    rng.fill(&mut sig[..32]);
    rng.fill(&mut sig[32..]);
    sig
}

fn random_input(rng: &mut StdRng) -> TransactionInput {
    match rng.gen_range(0..3) {
        0 => TransactionInput::Base(BaseInput {
            block_index: rng.gen_range(0..1_000_000),
        }),
        1 => {
            let ring = rng.gen_range(1..8);
            TransactionInput::Key(KeyInput {
                amount: rng.gen(),
                output_indexes: (0..ring).map(|_| rng.gen_range(0..10_000)).collect(),
                key_image: random_hash(rng),
            })
        }
        _ => TransactionInput::Multisignature(MultisignatureInput {
            amount: rng.gen(),
            signature_count: rng.gen_range(1..5),
            output_index: rng.gen_range(0..10_000),
        }),
    }
}

fn random_output(rng: &mut StdRng) -> TransactionOutput {
    let target = if rng.gen_bool(0.8) {
        TransactionOutputTarget::Key(KeyOutput {
            key: random_hash(rng),
        })
    } else {
        let count = rng.gen_range(1..4);
        TransactionOutputTarget::Multisignature(MultisignatureOutput {
            keys: (0..count).map(|_| random_hash(rng)).collect(),
            required_signature_count: rng.gen_range(1..=count) as u8,
        })
    };
    TransactionOutput {
        amount: rng.gen(),
        target,
    }
}

fn random_transaction(rng: &mut StdRng) -> Transaction {
    let inputs: Vec<TransactionInput> =
        (0..rng.gen_range(1..5)).map(|_| random_input(rng)).collect();
    let signatures = inputs
        .iter()
        .map(|input| {
            (0..input.signature_count())
                .map(|_| random_signature(rng))
                .collect()
        })
        .collect();
    let extra_len = rng.gen_range(0..16);
    Transaction {
        version: 1,
        unlock_time: rng.gen(),
        inputs,
        outputs: (0..rng.gen_range(1..5)).map(|_| random_output(rng)).collect(),
        extra: (0..extra_len).map(|_| rng.gen()).collect(),
        signatures,
    }
}

#[test]
fn transaction_round_trips() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..200 {
        let tx = random_transaction(&mut rng);
        let decoded: Transaction = decode(&encode(&tx)).expect("round trip");
        assert_eq!(decoded, tx);
    }
}

#[test]
fn block_round_trips() {
    let mut rng = StdRng::seed_from_u64(0xb10c);
    for _ in 0..100 {
        let coinbase = Transaction {
            version: 1,
            unlock_time: rng.gen(),
            inputs: vec![TransactionInput::Base(BaseInput {
                block_index: rng.gen_range(0..1_000_000),
            })],
            outputs: vec![random_output(&mut rng)],
            extra: vec![0x01; 33],
            signatures: vec![vec![]],
        };
        let block = Block {
            header: BlockHeader {
                major_version: 1,
                minor_version: 0,
                timestamp: rng.gen(),
                previous_block_hash: random_hash(&mut rng),
                nonce: rng.gen(),
            },
            parent_block: None,
            base_transaction: coinbase,
            transaction_hashes: (0..rng.gen_range(0..10))
                .map(|_| random_hash(&mut rng))
                .collect(),
        };
        let decoded: Block = decode(&encode(&block)).expect("round trip");
        assert_eq!(decoded, block);
        assert_eq!(decoded.hash(), block.hash());
    }
}

#[test]
fn encoding_is_deterministic() {
    let mut rng = StdRng::seed_from_u64(42);
    let tx = random_transaction(&mut rng);
    assert_eq!(encode(&tx), encode(&tx));
}
