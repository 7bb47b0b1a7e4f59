pub mod agent_loop;
pub mod assembler;
pub mod error;
pub mod formulas;
pub mod llm_protocol;
pub mod proxy;
pub mod session;
pub mod toolhost;
pub mod tools;
pub mod wire;
