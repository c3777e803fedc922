pub mod completion;
pub mod composer;
pub mod export;
pub mod library;
pub mod llm;
pub mod markup;
pub mod share;
