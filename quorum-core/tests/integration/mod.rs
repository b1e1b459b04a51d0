mod key_lifecycle;
mod nonce_concurrency;
mod repository_guard;
mod request_flow;
mod storage_persistence;
