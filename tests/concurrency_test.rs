use evm_sandbox::executor::{CallRequest, CreateAccountRequest, DeployRequest, Sandbox, Status};
use std::sync::Arc;

// Runtime storing its calldata word in slot 0 and returning the slot.
const STORE_AND_LOAD: &str = "6011600c60003960116000f360003560005560005460005260206000f3";

fn word(value: u64) -> String {
    format!("{:064x}", value)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deploys_and_calls_stay_isolated() {
    let sandbox = Arc::new(Sandbox::default());

    let tasks: Vec<_> = (1..=16u64)
        .map(|i| {
            let sandbox = sandbox.clone();
            tokio::task::spawn_blocking(move || {
                let from = sandbox
                    .create_account(CreateAccountRequest { balance: 0, address: None })
                    .unwrap()
                    .address;
                let deployed = sandbox
                    .deploy(DeployRequest {
                        from: from.clone(),
                        code: STORE_AND_LOAD.to_string(),
                        ..Default::default()
                    })
                    .unwrap();
                assert_eq!(deployed.status, Status::Success, "{}", deployed.message);
                let contract = deployed.address.unwrap();

                let called = sandbox
                    .call(CallRequest {
                        from,
                        to: contract.clone(),
                        value: 0,
                        input: word(i),
                    })
                    .unwrap();
                assert_eq!(called.status, Status::Success, "{}", called.message);
                (i, contract, called.output)
            })
        })
        .collect();

    let mut contracts = Vec::new();
    for task in tasks {
        let (i, contract, output) = task.await.unwrap();
        assert_eq!(output, word(i));
        contracts.push(contract);
    }

    contracts.sort();
    contracts.dedup();
    assert_eq!(contracts.len(), 16);
    for contract in &contracts {
        let view = sandbox.account(contract).unwrap().unwrap();
        assert_eq!(view.storage_slots, 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_conserve_balance() {
    let sandbox = Arc::new(Sandbox::default());
    let payer = sandbox
        .create_account(CreateAccountRequest { balance: 1_000, address: None })
        .unwrap()
        .address;

    let tasks: Vec<_> = (0..20u64)
        .map(|i| {
            let sandbox = sandbox.clone();
            let payer = payer.clone();
            tokio::task::spawn_blocking(move || {
                sandbox
                    .call(CallRequest {
                        from: payer,
                        to: format!("0x{:x}", 0xa000 + i),
                        value: 60,
                        input: String::new(),
                    })
                    .unwrap()
                    .status
            })
        })
        .collect();

    let mut succeeded = 0;
    for task in tasks {
        if task.await.unwrap() == Status::Success {
            succeeded += 1;
        }
    }

    // 1000 / 60 transfers fit.
    assert_eq!(succeeded, 16);
    let remaining = sandbox.account(&payer).unwrap().unwrap().balance;
    assert_eq!(remaining, (1_000 - 16 * 60).to_string());
}
