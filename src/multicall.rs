use crate::metrics;
use anyhow::Result;
use async_trait::async_trait;
use ethers::abi::{Function, Param, ParamType, StateMutability, Token};
use ethers::prelude::*;
use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;

/// Canonical Multicall3 deployment, identical on nearly every EVM chain.
pub const MULTICALL3_ADDRESS: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";

const MAX_BATCH_SIZE: usize = 200;
const MIN_BATCH_SIZE: usize = 50;

/// A single read call to be batched in a multicall.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Call {
    /// Target contract address
    pub target: Address,
    /// Encoded function selector and arguments
    pub call_data: Bytes,
}

/// Outcome of one call inside an aggregate request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    pub success: bool,
    pub return_data: Bytes,
}

/// Folds independent read calls into one round trip.
///
/// `None` means the aggregate itself could not be made (transport error,
/// malformed response, or a result count that does not match the input) and the
/// caller should fall back to individual reads. `Some` always has exactly one
/// [`CallResult`] per input call, in input order, and each result succeeds or
/// fails independently of its siblings.
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    async fn try_aggregate(&self, calls: Vec<Call>) -> Option<Vec<CallResult>>;
}

/// Multicall3 batch executor.
///
/// Uses `tryAggregate(false, calls)` so one reverting target does not revert
/// the whole batch. Large requests are split into chunks of at most
/// `batch_size` calls; identical calls are sent once.
///
/// ## Example
///
/// ```rust,ignore
/// let multicall = Multicall::new(provider, multicall_address, 200);
/// let results = multicall.try_aggregate(vec![
///     Call { target: token, call_data: balance_of_call },
///     Call { target: token, call_data: decimals_call },
/// ]).await;
/// ```
#[derive(Clone)]
pub struct Multicall<M: Middleware> {
    pub provider: Arc<M>,
    multicall_address: Address,
    batch_size: usize,
}

impl<M: Middleware + 'static> Multicall<M> {
    pub fn new(provider: Arc<M>, multicall_address: Address, batch_size: usize) -> Self {
        if batch_size > MAX_BATCH_SIZE {
            warn!(
                "Batch size {} exceeds recommended maximum ({}), capping",
                batch_size, MAX_BATCH_SIZE
            );
        }

        Self {
            provider,
            multicall_address,
            batch_size: batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE),
        }
    }

    pub fn address(&self) -> Address {
        self.multicall_address
    }

    async fn execute_chunk(&self, calls: Vec<Call>) -> Result<Vec<CallResult>> {
        let calldata = encode_try_aggregate(&calls)?;
        let tx: ethers::types::transaction::eip2718::TypedTransaction = TransactionRequest::new()
            .to(self.multicall_address)
            .data(calldata)
            .into();

        let response = self
            .provider
            .call(&tx, None)
            .await
            .map_err(|e| anyhow::anyhow!("multicall eth_call failed: {}", e))?;

        decode_try_aggregate(&response)
    }
}

#[async_trait]
impl<M: Middleware + 'static> BatchExecutor for Multicall<M> {
    async fn try_aggregate(&self, calls: Vec<Call>) -> Option<Vec<CallResult>> {
        aggregate_chunked(calls, self.batch_size, move |chunk| self.execute_chunk(chunk)).await
    }
}

/// Coalesces, chunks and reassembles an aggregate request around `execute`.
///
/// Any chunk that errors or returns a result count different from its call
/// count turns the whole request into `None`.
pub async fn aggregate_chunked<F, Fut>(
    calls: Vec<Call>,
    batch_size: usize,
    mut execute: F,
) -> Option<Vec<CallResult>>
where
    F: FnMut(Vec<Call>) -> Fut,
    Fut: Future<Output = Result<Vec<CallResult>>>,
{
    if calls.is_empty() {
        return Some(Vec::new());
    }

    // Coalesce identical calls to reduce load
    let mut unique_calls = indexmap::IndexSet::new();
    let original_indices: Vec<usize> = calls
        .iter()
        .map(|call| unique_calls.insert_full(call.clone()).0)
        .collect();
    let unique_calls: Vec<Call> = unique_calls.into_iter().collect();
    debug!(
        "Multicall coalesced {} calls into {}",
        calls.len(),
        unique_calls.len()
    );

    let mut unique_results: Vec<CallResult> = Vec::with_capacity(unique_calls.len());
    for chunk in unique_calls.chunks(batch_size.max(1)) {
        metrics::record_multicall_batch_size(chunk.len() as f64);

        match execute(chunk.to_vec()).await {
            Ok(results) if results.len() == chunk.len() => unique_results.extend(results),
            Ok(results) => {
                warn!(
                    "Multicall returned {} results for {} calls, discarding batch",
                    results.len(),
                    chunk.len()
                );
                metrics::increment_multicall_unavailable();
                return None;
            }
            Err(e) => {
                warn!("Multicall aggregate call failed: {:#}", e);
                metrics::increment_multicall_unavailable();
                return None;
            }
        }
    }

    let results: Vec<CallResult> = original_indices
        .into_iter()
        .map(|index| unique_results[index].clone())
        .collect();

    (results.len() == calls.len()).then_some(results)
}

// `constant` is deprecated in ethabi but still a required field.
#[allow(deprecated)]
fn try_aggregate_function() -> Function {
    // function tryAggregate(bool requireSuccess, Call[] calls)
    //     returns (Result[] returnData)
    // Call: (address target, bytes callData), Result: (bool success, bytes returnData)
    Function {
        name: "tryAggregate".to_string(),
        inputs: vec![
            Param {
                name: "requireSuccess".to_string(),
                kind: ParamType::Bool,
                internal_type: None,
            },
            Param {
                name: "calls".to_string(),
                kind: ParamType::Array(Box::new(ParamType::Tuple(vec![
                    ParamType::Address,
                    ParamType::Bytes,
                ]))),
                internal_type: None,
            },
        ],
        outputs: vec![Param {
            name: "returnData".to_string(),
            kind: result_array_type(),
            internal_type: None,
        }],
        constant: None,
        state_mutability: StateMutability::Payable,
    }
}

fn result_array_type() -> ParamType {
    ParamType::Array(Box::new(ParamType::Tuple(vec![
        ParamType::Bool,
        ParamType::Bytes,
    ])))
}

/// ABI-encodes `tryAggregate(false, calls)`.
pub fn encode_try_aggregate(calls: &[Call]) -> Result<Bytes> {
    let call_tokens = calls
        .iter()
        .map(|call| {
            Token::Tuple(vec![
                Token::Address(call.target),
                Token::Bytes(call.call_data.to_vec()),
            ])
        })
        .collect();

    let encoded =
        try_aggregate_function().encode_input(&[Token::Bool(false), Token::Array(call_tokens)])?;
    Ok(Bytes::from(encoded))
}

/// Decodes the `(bool success, bytes returnData)[]` response of `tryAggregate`.
pub fn decode_try_aggregate(response: &[u8]) -> Result<Vec<CallResult>> {
    let decoded = ethers::abi::decode(&[result_array_type()], response)?;

    let results_array = decoded
        .into_iter()
        .next()
        .and_then(|t| t.into_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid multicall response format"))?;

    results_array
        .into_iter()
        .map(|token| match token {
            Token::Tuple(fields) => match fields.as_slice() {
                [Token::Bool(success), Token::Bytes(data)] => Ok(CallResult {
                    success: *success,
                    return_data: Bytes::from(data.clone()),
                }),
                _ => Err(anyhow::anyhow!("Invalid multicall result tuple")),
            },
            _ => Err(anyhow::anyhow!("Invalid multicall result entry")),
        })
        .collect()
}
