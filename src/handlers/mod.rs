// handlers/mod.rs - Handler tiers
//
// public:    no session (service info, health)
// protected: session plus an active study; resources of the caller's study
// elevated:  session plus worker/superadmin roles; resources named by path

pub mod elevated;
pub mod protected;
pub mod public;
