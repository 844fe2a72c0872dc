//! Domain models for hustledesk-service.

mod audit;
mod customer;
mod expense;
mod invoice;
mod mpesa;
mod order;
mod organization;
mod payment;
mod product;
mod report;
mod subscription;
mod task;

pub use audit::AuditEntry;
pub use customer::{Customer, CustomerSummary};
pub use expense::{Expense, ListExpensesFilter, EXPENSE_CATEGORIES};
pub use invoice::{
    next_invoice_number, CreateInvoice, Invoice, InvoiceDetail, InvoiceRow, InvoiceSource,
    InvoiceStatus, ListInvoicesFilter, Settlement,
};
pub use mpesa::{
    C2bPayment, CreatePendingStk, MpesaKind, MpesaStatus, MpesaTransaction, ReconcileOutcome,
    StkOutcome,
};
pub use order::{
    CreateOrder, Order, OrderDetail, OrderItem, OrderRow, PricedLine, ORDER_STATUS_COMPLETED,
};
pub use organization::{CreateOrganization, Member, OrgMembership, Organization, Outlet, Role};
pub use payment::{CreateInvoicePayment, Payment, Tender};
pub use product::{
    CreateMovement, InventoryMovement, MovementType, Product, ProductWithStock, DEFAULT_UNIT,
    PRODUCT_UNITS,
};
pub use report::{change_percentage, ExpenseTotals, ReportSummary, SalesTotals};
pub use subscription::{
    BillingEventAction, BillingInvoice, BillingStatus, Plan, PlanLimits, Subscription, SubscriptionSync,
    UpsertBillingInvoice, UsageMetric, UsageRecord, UsageSummary, SUBSCRIPTION_ACTIVE,
    SUBSCRIPTION_INACTIVE,
};
pub use task::Task;
