use anyhow::Result;
use chrono::{Datelike, NaiveDate};

use backoffice::config::CatalogConfig;
use backoffice::errors::CmsError;
use backoffice::events::*;
use backoffice::expenses::*;
use backoffice::orders::*;
use backoffice::services::{Commandable, Queryable};
use backoffice::Backoffice;
use infra::memory::MemoryConnectionManager;

fn backoffice() -> Result<Backoffice<MemoryConnectionManager>> {
    env_logger::try_init().unwrap_or_default();
    Backoffice::in_memory(&CatalogConfig::default())
}

fn place(bo: &Backoffice<MemoryConnectionManager>, number: &str) -> Result<Order> {
    bo.orders().execute(PlaceOrder(OrderForm {
        order_number: number.to_string(),
        customer_name: Some("Sam".to_string()),
        total: 7.5,
    }))
}

#[test]
fn queue_holds_open_orders_oldest_first() -> Result<()> {
    let bo = backoffice()?;
    let first = place(&bo, "A-1")?;
    let second = place(&bo, "A-2")?;
    let third = place(&bo, "A-3")?;

    bo.orders().execute(UpdateOrderStatus {
        id: second.id,
        status: OrderStatus::Completed,
    })?;
    let ready = bo.orders().execute(UpdateOrderStatus {
        id: third.id,
        status: OrderStatus::Ready,
    })?;
    assert_eq!(ready.status, OrderStatus::Ready);
    assert!(ready.updated_at.is_some());

    let queue = bo.orders().query(ListOrderQueue)?;
    assert_eq!(
        queue.iter().map(|o| o.id).collect::<Vec<_>>(),
        vec![first.id, third.id]
    );
    Ok(())
}

#[test]
fn order_numbers_are_unique() -> Result<()> {
    let bo = backoffice()?;
    place(&bo, "A-1")?;

    let err = place(&bo, "A-1").expect_err("duplicate number");
    assert!(
        matches!(err.downcast_ref::<CmsError>(), Some(CmsError::Conflict(_))),
        "{:?}",
        err
    );
    Ok(())
}

#[test]
fn feed_counts_unread_orders_across_polls() -> Result<()> {
    let bo = backoffice()?;
    let mut feed = NotificationFeed::new();
    let first = place(&bo, "A-1")?;
    place(&bo, "A-2")?;

    let polled = bo.orders().query(PollNewOrders {
        since: feed.last_seen(),
    })?;
    assert_eq!(feed.ingest(&polled), 2);
    assert_eq!(feed.unread_count(), 2);
    feed.mark_read(first.id);
    assert_eq!(feed.unread_count(), 1);

    let latest = place(&bo, "A-3")?;
    let polled = bo.orders().query(PollNewOrders {
        since: feed.last_seen(),
    })?;
    assert_eq!(polled.iter().map(|o| o.id).collect::<Vec<_>>(), vec![latest.id]);
    feed.ingest(&polled);
    assert_eq!(feed.notifications()[0].order_id, latest.id);
    assert_eq!(feed.unread_count(), 2);

    feed.mark_all_read();
    assert_eq!(feed.unread_count(), 0);
    feed.clear();
    assert!(feed.notifications().is_empty());
    Ok(())
}

fn event_form(title: &str, date: Option<NaiveDate>) -> EventForm {
    EventForm {
        title: title.to_string(),
        description: None,
        event_date: date,
        location: Some("Main street".to_string()),
        image_url: None,
        is_published: false,
    }
}

#[test]
fn events_list_newest_first_and_publish() -> Result<()> {
    let bo = backoffice()?;
    let tasting = bo.events().execute(CreateEvent(event_form(
        "Tasting",
        Some(NaiveDate::from_ymd(2020, 3, 14)),
    )))?;
    bo.events().execute(CreateEvent(event_form("Open mic", None)))?;
    bo.events().execute(CreateEvent(event_form(
        "Latte art",
        Some(NaiveDate::from_ymd(2020, 6, 1)),
    )))?;

    let titles = |published_only| -> Result<Vec<String>> {
        Ok(bo
            .events()
            .query(ListEvents { published_only })?
            .into_iter()
            .map(|e| e.title)
            .collect())
    };
    assert_eq!(titles(false)?, vec!["Latte art", "Tasting", "Open mic"]);
    assert!(titles(true)?.is_empty());

    bo.events().execute(SetEventPublished {
        id: tasting.id,
        published: true,
    })?;
    assert_eq!(titles(true)?, vec!["Tasting"]);

    let err = bo
        .events()
        .execute(UpdateEvent {
            id: tasting.id,
            form: EventForm {
                image_url: Some("images/tasting.png".to_string()),
                ..event_form("Tasting", None)
            },
        })
        .expect_err("relative image url");
    assert!(
        matches!(err.downcast_ref::<CmsError>(), Some(CmsError::Validation(_))),
        "{:?}",
        err
    );

    bo.events().execute(DeleteEvent(tasting.id))?;
    assert_eq!(bo.events().query(GetEvent(tasting.id))?, None);
    let err = bo
        .events()
        .execute(DeleteEvent(tasting.id))
        .expect_err("already deleted");
    assert!(
        matches!(err.downcast_ref::<CmsError>(), Some(CmsError::NotFound { .. })),
        "{:?}",
        err
    );
    Ok(())
}

fn expense(category: &str, amount: f64, day: u32) -> ExpenseForm {
    ExpenseForm {
        description: format!("{} for May", category),
        amount,
        category: category.to_string(),
        expense_date: NaiveDate::from_ymd(2020, 5, day),
        notes: None,
    }
}

#[test]
fn expenses_summarize_within_a_range() -> Result<()> {
    let bo = backoffice()?;
    for form in vec![
        expense("Rent", 900.0, 1),
        expense("Beans", 120.0, 10),
        expense("Milk", 30.0, 10),
        expense("Beans", 80.0, 20),
        expense("Milk", 25.0, 31),
    ] {
        bo.expenses().execute(CreateExpense(form))?;
    }
    let range = DateRange {
        from: Some(NaiveDate::from_ymd(2020, 5, 10)),
        to: Some(NaiveDate::from_ymd(2020, 5, 20)),
    };

    let listed = bo.expenses().query(ListExpenses(range))?;
    assert_eq!(
        listed.iter().map(|e| e.expense_date.day()).collect::<Vec<_>>(),
        vec![20, 10, 10]
    );

    let summary = bo.expenses().query(SummarizeExpenses(range))?;
    assert_eq!(summary.total, 230.0);
    assert_eq!(
        summary
            .by_category
            .iter()
            .map(|t| (t.category.as_str(), t.total))
            .collect::<Vec<_>>(),
        vec![("Beans", 200.0), ("Milk", 30.0)]
    );

    let rent = bo.expenses().query(ListExpenses::default())?.pop().expect("rent");
    assert_eq!(rent.category, "Rent");
    let updated = bo.expenses().execute(UpdateExpense {
        id: rent.id,
        form: expense("Rent", 950.0, 1),
    })?;
    assert_eq!(updated.created_at, rent.created_at);
    assert_eq!(updated.amount, 950.0);
    Ok(())
}
