use crate::core::Transaction;

/// Transactions waiting to be mined, in submission order.
///
/// The pool has no lock of its own: it is owned by the chain and mutated only
/// under the chain's lock, so draining it for a candidate block and accepting
/// new submissions can never interleave.
#[derive(Debug, Clone, Default)]
pub struct MemoryPool {
    inner: Vec<Transaction>,
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool { inner: Vec::new() }
    }

    pub fn from_transactions(transactions: Vec<Transaction>) -> MemoryPool {
        MemoryPool {
            inner: transactions,
        }
    }

    pub fn get(&self, txid: &str) -> Option<&Transaction> {
        self.inner.iter().find(|tx| tx.get_id() == txid)
    }

    pub fn add(&mut self, tx: Transaction) {
        self.inner.push(tx);
    }

    pub fn contains(&self, txid: &str) -> bool {
        self.get(txid).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get_all(&self) -> &[Transaction] {
        self.inner.as_slice()
    }

    /// Take every pending transaction, leaving the pool empty.
    pub fn drain(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.inner)
    }

    /// Put transactions from an abandoned block back ahead of newer arrivals.
    pub fn restore_front(&mut self, transactions: Vec<Transaction>) {
        let newer = std::mem::replace(&mut self.inner, transactions);
        self.inner.extend(newer);
    }
}
