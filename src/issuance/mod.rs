pub mod acme;
pub mod acme_workflow;
pub mod challenge;
pub mod flow;
pub mod issuer;
pub mod polling;
pub mod requester;
pub mod validator;
