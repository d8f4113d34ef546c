mod pipeline;
mod support;
mod webfaction_api;
