mod login;

pub use login::ApiClient;
