pub mod memory;
pub mod postgrest;
pub mod store;
pub mod supabase;

pub use memory::InMemoryStore;
pub use postgrest::PostgrestStore;
pub use store::{ClinicStore, StoreError, StoreResult};
pub use supabase::SupabaseClient;
