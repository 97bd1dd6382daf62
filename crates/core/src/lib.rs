pub mod codes;
pub mod config;
pub mod debit;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod ports;

pub use codes::{CodeGenerator, RandomCodeGenerator};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use debit::{plan_proportional_debit, DebitPlan, MemberDebit};
pub use domain::member::{group_balance, GroupId, MemberBalance, MemberId};
pub use domain::offer::{Offer, OfferId};
pub use domain::redemption::{
    Approval, RedemptionId, RedemptionRequest, RedemptionStatus,
};
pub use engine::{
    ApprovalOutcome, RedemptionEngine, RedemptionPolicy, RedemptionRequestInput,
};
pub use errors::{ApplicationError, DomainError, DomainErrorKind};
pub use ports::{
    InMemoryMemberBalanceStore, InMemoryOfferCatalog, InMemoryRedemptionStore,
    MemberBalanceStore, OfferCatalog, RedemptionStore, StoreError,
};
