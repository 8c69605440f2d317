mod ledger;
mod matcher;
mod queue;
