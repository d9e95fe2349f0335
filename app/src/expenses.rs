use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use log::*;
use r2d2::Pool;
use serde::{Deserialize, Serialize};

use infra::ids::{Entity, Id, IdGen};
use infra::persistence::Storage;
use infra::records::{Filter, Record};

use crate::catalog::filter::by_name;
use crate::errors::{CmsError, StorageResultExt};
use crate::services::{optional_text, require_text, Commandable, Queryable, Request, Validate};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Expense {
    pub id: Id<Expense>,
    pub description: String,
    pub amount: f64,
    pub category: String,
    pub expense_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ExpenseForm {
    pub description: String,
    pub amount: f64,
    pub category: String,
    pub expense_date: NaiveDate,
    pub notes: Option<String>,
}

/// An inclusive date range; either end may be open.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
    pub count: usize,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ExpenseSummary {
    pub total: f64,
    pub by_category: Vec<CategoryTotal>,
}

impl Entity for Expense {
    const PREFIX: &'static str = "expense";
}

impl Record for Expense {
    const TABLE: &'static str = "expenses";
    fn id(&self) -> Id<Self> {
        self.id
    }
}

impl Expense {
    fn new(id: Id<Expense>, form: &ExpenseForm, now: DateTime<Utc>) -> Self {
        Expense {
            id,
            description: form.description.trim().to_string(),
            amount: form.amount,
            category: form.category.trim().to_string(),
            expense_date: form.expense_date,
            notes: optional_text(&form.notes),
            created_at: now,
        }
    }
}

impl Validate for ExpenseForm {
    fn validate(&self) -> Result<(), CmsError> {
        require_text("Description", &self.description)?;
        require_text("Category", &self.category)?;
        if !(self.amount > 0.0) {
            return Err(CmsError::validation("Amount must be greater than zero"));
        }
        if !self.amount.is_finite() {
            return Err(CmsError::validation("Amount must be a finite number"));
        }
        Ok(())
    }
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map(|from| date >= from).unwrap_or(true)
            && self.to.map(|to| date <= to).unwrap_or(true)
    }
}

/// Totals per category, keyed case-insensitively under the first spelling
/// seen, and listed by name.
pub fn summarize(expenses: &[Expense]) -> ExpenseSummary {
    let mut totals: BTreeMap<String, CategoryTotal> = BTreeMap::new();
    for expense in expenses {
        let entry = totals
            .entry(expense.category.to_lowercase())
            .or_insert_with(|| CategoryTotal {
                category: expense.category.clone(),
                total: 0.0,
                count: 0,
            });
        entry.total += expense.amount;
        entry.count += 1;
    }
    let mut by_category = totals.into_iter().map(|(_, t)| t).collect::<Vec<_>>();
    by_category.sort_by(|a, b| by_name(&a.category, &b.category));
    ExpenseSummary {
        total: expenses.iter().map(|e| e.amount).sum(),
        by_category,
    }
}

#[derive(Debug)]
pub struct Expenses<M: r2d2::ManageConnection> {
    db: Pool<M>,
    idgen: IdGen,
}

/// Newest first.
#[derive(Debug, Clone, Default)]
pub struct ListExpenses(pub DateRange);

#[derive(Debug, Clone)]
pub struct CreateExpense(pub ExpenseForm);

#[derive(Debug, Clone)]
pub struct UpdateExpense {
    pub id: Id<Expense>,
    pub form: ExpenseForm,
}

#[derive(Debug, Clone)]
pub struct DeleteExpense(pub Id<Expense>);

#[derive(Debug, Clone, Default)]
pub struct SummarizeExpenses(pub DateRange);

impl Request for ListExpenses {
    type Resp = Vec<Expense>;
}
impl Request for CreateExpense {
    type Resp = Expense;
}
impl Request for UpdateExpense {
    type Resp = Expense;
}
impl Request for DeleteExpense {
    type Resp = ();
}
impl Request for SummarizeExpenses {
    type Resp = ExpenseSummary;
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Expenses<M> {
    pub fn new(db: Pool<M>, idgen: IdGen) -> Self {
        Expenses { db, idgen }
    }

    fn within(&self, range: &DateRange) -> Result<Vec<Expense>> {
        let mut expenses = self
            .db
            .get()?
            .select::<Expense>(&Filter::all())
            .translated()?
            .into_iter()
            .filter(|e| range.contains(e.expense_date))
            .collect::<Vec<_>>();
        expenses.sort_by(|a, b| {
            b.expense_date
                .cmp(&a.expense_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(expenses)
    }
}

impl<M: r2d2::ManageConnection> Clone for Expenses<M> {
    fn clone(&self) -> Self {
        let db = self.db.clone();
        let idgen = self.idgen.clone();
        Expenses { db, idgen }
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<ListExpenses> for Expenses<M>
{
    fn query(&self, ListExpenses(range): ListExpenses) -> Result<Vec<Expense>> {
        self.within(&range)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<CreateExpense> for Expenses<M>
{
    fn execute(&self, CreateExpense(form): CreateExpense) -> Result<Expense> {
        form.validate()?;
        let expense = Expense::new(self.idgen.generate(), &form, Utc::now());
        let expense = self.db.get()?.insert(&expense).translated()?;
        info!("Recorded expense {}: {} {}", expense.id, expense.category, expense.amount);
        Ok(expense)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<UpdateExpense> for Expenses<M>
{
    fn execute(&self, req: UpdateExpense) -> Result<Expense> {
        req.form.validate()?;
        let docs = self.db.get()?;
        let existing = docs
            .load::<Expense>(&req.id)
            .translated()?
            .ok_or_else(|| CmsError::not_found(&req.id))?;
        let expense = Expense::new(existing.id, &req.form, existing.created_at);
        let expense = docs.update(&expense).translated()?;
        debug!("Updated expense {:?}", expense);
        Ok(expense)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<DeleteExpense> for Expenses<M>
{
    fn execute(&self, DeleteExpense(id): DeleteExpense) -> Result<()> {
        self.db.get()?.delete(&id).translated()?;
        info!("Deleted expense {}", id);
        Ok(())
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<SummarizeExpenses> for Expenses<M>
{
    fn query(&self, SummarizeExpenses(range): SummarizeExpenses) -> Result<ExpenseSummary> {
        Ok(summarize(&self.within(&range)?))
    }
}
